//! Bot dispatch: event model, command router, update dispatcher and the chat transport seam.
//! teloxide stays inside channels::telegram; everything else talks to `ChatTransport`.
//! Log format: [PulseBot][bot][component] key=value ...

pub mod channels;
pub mod dispatcher;
pub mod event;
pub mod handlers;
pub mod log;
pub mod router;
#[cfg(test)]
pub mod testutil;
pub mod transport;

pub use channels::telegram;
