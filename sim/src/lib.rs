// Copyright (c) 2022-2023 The MobileCoin Foundation

//! In-memory keycard simulator
//!
//! Provides a [SimCard] with applet state (PIN / PUK, pairing slots,
//! keys, public data) and a [SimChannel] reader implementing
//! [keycard_flow::CardChannel], for exercising flows without hardware.

mod card;
pub use card::*;

mod channel;
pub use channel::SimChannel;
