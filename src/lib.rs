//! # rddwrt - DD-WRT Router Client
//!
//! `rddwrt` queries DD-WRT routers for the devices connected to them and for
//! interface traffic counters. It is meant to be polled periodically, e.g. by
//! a presence-detection or bandwidth-monitoring service.
//!
//! ## Features
//!
//! - **Three Transports**: SSH (password or key), Telnet and the HTTP web UI
//! - **Device Directory**: Merges wireless associations, the ARP table and DHCP leases by MAC
//! - **Forgiving Parsing**: Unparseable output lines are logged and skipped
//! - **Transfer Rates**: Byte counters sampled with a 30 second floor and counter-reset handling
//! - **Poll Friendly**: Timeouts yield empty results; only unreachable routers return errors
//! - **Async/Await**: Built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rddwrt::{DdWrtClient, Protocol, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RouterConfig::new("192.168.1.1")
//!         .protocol(Protocol::Ssh)
//!         .username("root")
//!         .password("admin");
//!     let client = DdWrtClient::new(config);
//!
//!     for (mac, device) in client.get_connected_devices().await? {
//!         println!("{mac} {:?} {:?}", device.ip, device.name);
//!     }
//!
//!     let (rx, tx) = client.get_current_transfer_human_readable(true).await?;
//!     println!("down {rx} up {tx}");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`DdWrtClient`] - Public query surface for one router
//! - [`transport::Transport`] - SSH, Telnet, HTTP and replay transports
//! - [`parser`] - Router commands, output patterns and scrapers
//! - [`device::DeviceDirectory`] - Merges device sources by MAC
//! - [`traffic::RateTracker`] - Transfer-rate sampling
//! - [`error::RouterError`] - Error types for connection and query failures

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod parser;
pub mod traffic;
pub mod transport;

pub use client::DdWrtClient;
pub use config::{LeaseMergePolicy, Mode, Protocol, RouterConfig};
pub use device::Device;
pub use error::RouterError;
pub use traffic::{ByteTotals, TransferRates};
