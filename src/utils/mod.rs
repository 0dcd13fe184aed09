pub mod hash;
pub mod keyed_mutex;
pub mod object_key;
pub mod validation;
