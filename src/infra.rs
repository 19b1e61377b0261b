pub mod jetstream;
pub mod postgres;
