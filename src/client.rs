//! The router client and its public queries.
//!
//! [`DdWrtClient`] picks a [`Transport`] once from the configuration and maps
//! every query onto the fixed router commands or status pages. Device
//! queries return an empty collection when the router timed out, and `Err`
//! only when it could not be reached at all.

use std::collections::BTreeMap;
use std::time::Instant;

use log::debug;
use tokio::sync::{Mutex, OnceCell};

use crate::config::{Mode, Protocol, RouterConfig};
use crate::device::{Device, DeviceDirectory, canonical_mac};
use crate::error::RouterError;
use crate::parser::{self, LeaseRecord};
use crate::traffic::{ByteTotals, ByteTotalsCache, RateTracker, TransferRates};
use crate::transport::Transport;

/// Client for one DD-WRT router.
pub struct DdWrtClient {
    config: RouterConfig,
    transport: Transport,
    /// Association-list command chosen by the `wl ver` probe.
    wl_cmd: OnceCell<&'static str>,
    totals_cache: ByteTotalsCache,
    rates: Mutex<RateTracker>,
}

impl DdWrtClient {
    pub fn new(config: RouterConfig) -> Self {
        let transport = Transport::from_config(&config, None);
        Self::with_transport(config, transport)
    }

    /// Builds an HTTP client on a caller-owned `reqwest::Client`.
    ///
    /// The caller keeps responsibility for the client's lifecycle; [`close`]
    /// leaves it untouched.
    ///
    /// [`close`]: DdWrtClient::close
    pub fn with_http_client(config: RouterConfig, http_client: reqwest::Client) -> Self {
        let transport = Transport::from_config(&config, Some(http_client));
        Self::with_transport(config, transport)
    }

    /// Builds a client on an explicit transport, e.g. a replay.
    pub fn with_transport(config: RouterConfig, transport: Transport) -> Self {
        Self {
            totals_cache: ByteTotalsCache::new(config.cache_ttl_duration()),
            rates: Mutex::new(RateTracker::new(config.rate_floor_duration())),
            wl_cmd: OnceCell::new(),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn uses_http(&self) -> bool {
        self.transport.protocol() == Protocol::Http
    }

    /// Probes the wireless driver once. An empty probe (timeout) is not
    /// remembered, so the next query probes again.
    async fn wireless_command(&self) -> Result<&'static str, RouterError> {
        if let Some(command) = self.wl_cmd.get().copied() {
            return Ok(command);
        }
        let lines = self.transport.run_command(parser::WL_VERSION_CMD).await?;
        let command = parser::select_wireless_command(&lines);
        if lines.iter().any(|line| !line.trim().is_empty()) {
            debug!(
                "Wireless driver probe on {} selected {}",
                self.config.host,
                if command == parser::WL_CMD { "wl" } else { "iw" }
            );
            // Losing the race to a concurrent probe is fine.
            self.wl_cmd.set(command).ok();
        }
        Ok(command)
    }

    /// MACs of clients associated with the wireless radios, uppercased.
    pub async fn get_wireless_clients(&self) -> Result<Vec<String>, RouterError> {
        let macs = if self.uses_http() {
            let page = self.transport.get_page(parser::WIRELESS_STATUS_PAGE).await?;
            parser::parse_http_wireless(&page)
        } else {
            let command = self.wireless_command().await?;
            let lines = self.transport.run_command(command).await?;
            parser::parse_macs(&lines)
        };
        Ok(macs.iter().map(|mac| canonical_mac(mac)).collect())
    }

    /// Neighbor table keyed by MAC. Empty over HTTP.
    pub async fn get_arp_table(&self) -> Result<BTreeMap<String, Device>, RouterError> {
        if self.uses_http() {
            return Ok(BTreeMap::new());
        }
        let lines = self.transport.run_command(parser::ARP_CMD).await?;
        Ok(parser::parse_arp(&lines)
            .into_iter()
            .map(|(mac, ip)| {
                let device = Device::with_ip(&mac, ip);
                (device.mac.clone(), device)
            })
            .collect())
    }

    /// DHCP leases keyed by MAC, with `*` hostnames normalized to empty.
    pub async fn get_leases(&self) -> Result<BTreeMap<String, Device>, RouterError> {
        let leases: Vec<LeaseRecord> = if self.uses_http() {
            let page = self.transport.get_page(parser::LAN_STATUS_PAGE).await?;
            parser::parse_http_leases(&page)
        } else {
            let lines = self.transport.run_command(parser::LEASES_CMD).await?;
            parser::parse_shell_leases(&lines)
        };
        Ok(leases
            .iter()
            .map(|lease| {
                let device = Device::from_lease(lease);
                (device.mac.clone(), device)
            })
            .collect())
    }

    /// Merged directory: wireless, then ARP, then leases (router mode only).
    pub async fn get_connected_devices(&self) -> Result<BTreeMap<String, Device>, RouterError> {
        let mut directory = DeviceDirectory::new();

        let wireless = self.get_wireless_clients().await?;
        directory.merge_wireless(&wireless);

        let arp = self.get_arp_table().await?;
        directory.merge_arp(arp.values());

        match self.config.mode {
            Mode::Router => {
                let leases = self.get_leases().await?;
                directory.merge_leases(leases.values(), self.config.lease_policy);
            }
            Mode::AccessPoint => debug!("Access point mode, skipping leases"),
        }

        if self.config.require_ip {
            directory.retain_with_ip();
        }
        debug!(
            "{} connected devices on {}",
            directory.len(),
            self.config.host
        );
        Ok(directory.into_map())
    }

    async fn read_counter(&self, command: &str) -> Result<u64, RouterError> {
        if self.uses_http() {
            return Err(RouterError::Unsupported {
                protocol: Protocol::Http,
                operation: "byte counters",
            });
        }
        let lines = self.transport.run_command(command).await?;
        let first = lines
            .first()
            .ok_or_else(|| RouterError::CounterParse(String::new()))?;
        parser::parse_counter(first).ok_or_else(|| RouterError::CounterParse(first.clone()))
    }

    /// Total bytes received since the interface came up.
    pub async fn get_rx_bytes(&self) -> Result<u64, RouterError> {
        self.read_counter(parser::RX_COMMAND).await
    }

    /// Total bytes sent since the interface came up.
    pub async fn get_tx_bytes(&self) -> Result<u64, RouterError> {
        self.read_counter(parser::TX_COMMAND).await
    }

    /// RX and TX totals, served from the cache when `use_cache` and still fresh.
    pub async fn get_bytes_total(&self, use_cache: bool) -> Result<ByteTotals, RouterError> {
        if use_cache && let Some(totals) = self.totals_cache.get().await {
            debug!("Byte totals for {} served from cache", self.config.host);
            return Ok(totals);
        }
        let totals = ByteTotals::new(self.get_rx_bytes().await?, self.get_tx_bytes().await?);
        self.totals_cache.insert(totals).await;
        Ok(totals)
    }

    /// Current transfer rates in bytes per second.
    pub async fn get_current_transfer_rates(
        &self,
        use_cache: bool,
    ) -> Result<TransferRates, RouterError> {
        let totals = self.get_bytes_total(use_cache).await?;
        let mut tracker = self.rates.lock().await;
        Ok(tracker.update(totals, Instant::now()))
    }

    /// Current transfer rates formatted like `("1.5 KB/s", "0B/s")`.
    pub async fn get_current_transfer_human_readable(
        &self,
        use_cache: bool,
    ) -> Result<(String, String), RouterError> {
        Ok(self
            .get_current_transfer_rates(use_cache)
            .await?
            .human_readable())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Releases the transport's socket or session.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
