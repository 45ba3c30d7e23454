//! Radio driver contract and registry.
//!
//! Each hardware backend implements [`RadioDriver`] once. Drivers are held by
//! an explicit [`RadioRegistry`] owned by the [`Tmesh`](crate::mesh::Tmesh)
//! manager, which also caches every medium a driver has acquired so that all
//! communities referencing the same identity share one [`Medium`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::medium::{Medium, MediumId, MediumTiming};
use crate::core::{RADIOS_MAX, RadioError};

/// Registry index of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RadioId(pub u8);

/// Contract implemented by every radio hardware backend.
///
/// No scheduling logic lives here; a driver only knows which mediums its
/// hardware can serve and what they cost.
pub trait RadioDriver: fmt::Debug {
    /// Estimate the energy cost of a medium, 0 if unrecognized.
    ///
    /// Must have no side effects; callers use it to pre-filter candidate
    /// mediums.
    fn energy(&self, medium: &MediumId) -> u32;

    /// Validate a medium and initialize hardware timing for it.
    fn acquire(&mut self, medium: &MediumId) -> Result<MediumTiming, RadioError>;

    /// Called once no community references the medium anymore.
    fn release(&mut self, medium: &Medium);
}

/// Bounded table of registered drivers plus the cache of acquired mediums.
#[derive(Debug, Default)]
pub struct RadioRegistry {
    drivers: Vec<Box<dyn RadioDriver>>,
    media: Vec<Arc<Medium>>,
}

impl RadioRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver, returning the id knocks will be requested for.
    pub fn register(&mut self, driver: Box<dyn RadioDriver>) -> Result<RadioId, RadioError> {
        if self.drivers.len() >= RADIOS_MAX {
            return Err(RadioError::RegistryFull(RADIOS_MAX));
        }
        let id = RadioId(self.drivers.len() as u8);
        debug!(radio = id.0, ?driver, "registered radio driver");
        self.drivers.push(driver);
        Ok(id)
    }

    /// Number of registered drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Check if no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Check if a driver is registered under this id.
    pub fn contains(&self, radio: RadioId) -> bool {
        (radio.0 as usize) < self.drivers.len()
    }

    /// First non-zero energy estimate for a medium, 0 if no driver knows it.
    pub fn energy(&self, medium: &MediumId) -> u32 {
        self.drivers
            .iter()
            .map(|driver| driver.energy(medium))
            .find(|&cost| cost > 0)
            .unwrap_or(0)
    }

    /// Get the shared medium for an identity, acquiring it on first use.
    pub fn medium(&mut self, id: &MediumId) -> Result<Arc<Medium>, RadioError> {
        if let Some(medium) = self.cached(id) {
            return Ok(Arc::clone(medium));
        }

        for (index, driver) in self.drivers.iter_mut().enumerate() {
            let radio = RadioId(index as u8);
            match driver
                .acquire(id)
                .and_then(|timing| Medium::new(*id, timing, radio))
            {
                Ok(medium) => {
                    debug!(
                        medium = %id,
                        radio = radio.0,
                        min = medium.min(),
                        max = medium.max(),
                        chans = medium.chans(),
                        "acquired medium"
                    );
                    let medium = Arc::new(medium);
                    self.media.push(Arc::clone(&medium));
                    return Ok(medium);
                }
                Err(e) => trace!(medium = %id, radio = radio.0, error = %e, "driver declined medium"),
            }
        }

        Err(RadioError::NoMediumMatch(*id))
    }

    /// Get an already acquired medium.
    pub fn cached(&self, id: &MediumId) -> Option<&Arc<Medium>> {
        self.media.iter().find(|medium| medium.id() == *id)
    }

    /// Number of acquired mediums.
    pub fn media_len(&self) -> usize {
        self.media.len()
    }

    /// Hand every medium nobody else references back to its driver.
    ///
    /// Returns the number of mediums released.
    pub fn release_unused(&mut self) -> usize {
        let (unused, kept): (Vec<_>, Vec<_>) = self
            .media
            .drain(..)
            .partition(|medium| Arc::strong_count(medium) == 1);
        self.media = kept;

        for medium in &unused {
            if let Some(driver) = self.drivers.get_mut(medium.radio().0 as usize) {
                debug!(medium = %medium.id(), radio = medium.radio().0, "released medium");
                driver.release(medium);
            }
        }
        unused.len()
    }
}
