//! `conemap-middleware` – hand-off between sensor producers and the fusion
//! cycle.
//!
//! Producers run wherever the transport delivers messages; the consumer is a
//! single periodic cycle. The types here are the only state the two share.
//!
//! # Modules
//!
//! - [`buffer`] – [`ReadingBuffer`] (exactly-once pending readings) and
//!   [`ScanSlot`] (latest wide-field scan).

pub mod buffer;

pub use buffer::{ReadingBuffer, ScanSlot};
