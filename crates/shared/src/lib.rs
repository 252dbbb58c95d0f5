//! Wire types shared by everything that talks to the GymMaster backend.

pub mod models;

pub use models::*;
