mod archive;
mod exchange;
mod state;

pub use state::{ChatEngine, EngineUpdate, ExchangeCancel, ExchangeOutcome};
