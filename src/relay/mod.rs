//! Request relay: parameter validation, dispatch and orchestration

pub mod dispatcher;
pub mod parameters;
pub mod service;

pub use dispatcher::{Choice, ChoiceMessage, DispatcherConfig, RelayResult, RequestDispatcher};
pub use parameters::{EffectiveParameters, ParameterValidator, SamplingOverrides};
pub use service::{CallerIdentity, Relay, RelayOutcome, RelayRequest};
