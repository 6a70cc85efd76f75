pub mod discover;
pub mod info;
pub mod run;
pub mod validate;
