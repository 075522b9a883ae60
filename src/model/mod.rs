pub mod observation;
pub mod order;
pub mod release;
