//! Concrete chat channels. Each one implements ChatTransport and owns its platform SDK
//! types; nothing outside this tree imports them.

pub mod telegram;
