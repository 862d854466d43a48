//! sitewatch-probe — the seam through which sites are checked.
//!
//! A [`Prober`] turns a [`ProbeRequest`] into a `CheckResult`. Rich probing
//! (browser automation, screenshots, console errors) lives outside this
//! workspace behind the same trait; [`HttpProber`] is the built-in fallback.

pub mod http;
pub mod prober;

pub use http::HttpProber;
pub use prober::{ProbeError, ProbeRequest, ProbeResult, Prober};
