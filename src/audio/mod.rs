pub mod cleaner;
pub mod live;
pub mod source;
pub mod wav;
