//! IP geolocation contract.

use crate::peer::GeoLocation;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

/// Errors that can occur during a geolocation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// The resolver has no location for the address.
    NotFound(IpAddr),
    /// The resolver failed or could not be reached.
    Unavailable(String),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::NotFound(ip) => write!(f, "No location known for {ip}"),
            GeoError::Unavailable(reason) => write!(f, "Geolocation unavailable: {reason}"),
        }
    }
}

impl Error for GeoError {}

/// Resolves IP addresses to a location and network owner.
pub trait GeoResolver: Clone + Send + Sync + 'static {
    fn lookup(&self, ip: IpAddr) -> impl Future<Output = Result<GeoLocation, GeoError>> + Send;
}

/// Resolver answering from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoResolver {
    locations: Arc<HashMap<IpAddr, GeoLocation>>,
}

impl StaticGeoResolver {
    pub fn new(locations: HashMap<IpAddr, GeoLocation>) -> Self {
        StaticGeoResolver {
            locations: Arc::new(locations),
        }
    }
}

impl GeoResolver for StaticGeoResolver {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        self.locations
            .get(&ip)
            .cloned()
            .ok_or(GeoError::NotFound(ip))
    }
}
