// histo-net/src/lib.rs
pub mod http;
pub mod payload;
pub mod validation;
pub mod wire;

pub use histo_common::{
    error::{HistoError, Result},
    Config,
};
pub use http::HttpRemote;
pub use payload::StartEncoding;
pub use validation::validate_base_url;
