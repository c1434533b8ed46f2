mod load;
mod types;

pub use load::{expand_tilde, get_strata_data_dir, load, load_default, load_from_file, state_dir};
pub use types::*;
