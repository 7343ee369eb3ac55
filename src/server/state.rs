//! Shared server state (§5 CONCURRENCY & RESOURCE MODEL).
//!
//! `quit`/`reload_requested` live here rather than on `Config` itself: the
//! config value behind the `ArcSwap` is swapped wholesale on reload, so a
//! flag that must survive the swap can't live inside it. See DESIGN.md.

use crate::config::Config;
use crate::loopreg::LoopRegistry;
use crate::metrics::Metrics;
use crate::stats::Stats;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct ProxyState {
    config: ArcSwap<Config>,
    config_path: Option<PathBuf>,
    pub stats: Stats,
    pub loopreg: LoopRegistry,
    pub metrics: Metrics,
    quit: AtomicBool,
    reload_requested: AtomicBool,
}

impl ProxyState {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config: ArcSwap::new(Arc::new(config)),
            config_path,
            stats: Stats::new(),
            loopreg: LoopRegistry::new(),
            metrics: Metrics::install(),
            quit: AtomicBool::new(false),
            reload_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Set by the SIGHUP handler; picked up by the accept loop between
    /// connections rather than racing a reload against an in-flight one.
    pub fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::SeqCst);
    }

    pub async fn reload_if_requested(&self) {
        if !self.reload_requested.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(path) = self.config_path.clone() else {
            warn!("SIGHUP received but no config file was given at startup, ignoring");
            return;
        };
        match Config::load(&path) {
            Ok(new_config) => {
                self.config.store(Arc::new(new_config));
                metrics::counter!("tinyrelay_config_reloads_total").increment(1);
                info!(path = %path.display(), "configuration reloaded");
            }
            Err(e) => {
                error!("config reload failed, keeping previous configuration: {e:#}");
            }
        }
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn should_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

pub fn new_state(config: Config, config_path: Option<PathBuf>) -> Result<Arc<ProxyState>> {
    Ok(Arc::new(ProxyState::new(config, config_path)))
}
