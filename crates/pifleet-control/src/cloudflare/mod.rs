//! Cloudflare integration.
//!
//! A reqwest-based client for the Cloudflare v4 API covering named tunnels,
//! their ingress configuration and connector tokens, and proxied DNS records.

mod client;
pub mod types;


pub use client::{CloudflareClient, CloudflareError};
