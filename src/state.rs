use actix_web::web;
use std::net::IpAddr;

use crate::brute_force::Throttle;
use crate::config::Settings;
use crate::db::UserStore;
use crate::firewall;
use crate::models::ApiRequest;

#[derive(Debug)]
pub struct AppState {
    pub settings: Settings,
    pub store: UserStore,
    pub throttle: Throttle,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let store = UserStore::new(settings.server.notes_dir.clone());
        let throttle = Throttle::new(store.dir(), settings.brute_force.clone());
        Self {
            settings,
            store,
            throttle,
        }
    }
}

/// One API call after it passed the gate, with everything the action
/// handlers need from the HTTP request.
pub struct Caller {
    pub state: web::Data<AppState>,
    pub request: ApiRequest,
    /// Normalized, possibly empty.
    pub login: String,
    pub ip: Option<IpAddr>,
    pub origin: Option<String>,
    pub host: Option<String>,
    pub api_key: Option<String>,
}

impl Caller {
    pub fn ip_key(&self) -> String {
        firewall::ip_key(self.ip)
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }
}
