pub mod connections;
pub mod database;
pub mod doctor;
pub mod postgres;
pub mod run;
pub mod seed;
