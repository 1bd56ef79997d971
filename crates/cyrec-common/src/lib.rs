pub mod formatter;
pub mod protocol;
pub mod selector;
pub mod translator;
