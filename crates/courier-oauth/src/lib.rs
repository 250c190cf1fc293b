//! # courier-oauth
//!
//! `OAuth2` refresh-token support for the mail backends Courier talks to.
//!
//! Courier never runs an interactive authorization flow itself: the first
//! credential for an account is read out of the live mail client, and from
//! then on the refresh token stored with it is exchanged here for fresh
//! access tokens.
//!
//! ```ignore
//! use courier_oauth::{OAuthClient, Provider};
//!
//! let client = OAuthClient::new("client-id", Provider::google()?);
//! let token = client.refresh("stored-refresh-token").await?;
//! println!("expires at {:?}", token.expires_at);
//! ```
//!
//! ## Provider Support
//!
//! - **Google** - Gmail API, `https://mail.google.com/` scope
//! - **Microsoft** - Graph mail, `Mail.ReadWrite` / `Mail.Send` scopes
//! - **Custom** - any token endpoint (used by tests)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
pub mod provider;
pub mod token;

pub use client::OAuthClient;
pub use error::{Error, Result};
pub use provider::Provider;
pub use token::Token;
