pub mod class_names;
pub mod classes;
