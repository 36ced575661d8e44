pub mod audit;
pub mod character;
pub mod chunk;
pub mod config;
pub mod extractor;
pub mod ledger;
pub mod lock;
pub mod paths;
pub mod session;
pub mod upstream;
pub mod util;
pub mod warn;
