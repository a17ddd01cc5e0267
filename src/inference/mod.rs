pub mod models;
pub mod remote;
pub mod template;
