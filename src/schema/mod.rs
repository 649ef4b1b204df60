pub mod category;
pub mod data_model;
