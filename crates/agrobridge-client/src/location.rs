//! The buyer's current location and the one-shot resolver that fills it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agrobridge_core::Coordinates;
use thiserror::Error;
use tokio::sync::watch;

/// Shared holder of the buyer location.
///
/// Cloning is cheap and every clone refers to the same value. Observers get a
/// [`watch::Receiver`] from [`LocationStore::subscribe`] and are woken on each
/// change.
#[derive(Debug, Clone)]
pub struct LocationStore {
    tx: Arc<watch::Sender<Option<Coordinates>>>,
}

impl LocationStore {
    #[must_use]
    pub fn new(initial: Option<Coordinates>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Publishes `location`. Returns `false` and notifies nobody when it
    /// equals the current value.
    pub fn set(&self, location: Coordinates) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == Some(location) {
                false
            } else {
                *current = Some(location);
                true
            }
        })
    }

    #[must_use]
    pub fn current(&self) -> Option<Coordinates> {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Coordinates>> {
        self.tx.subscribe()
    }
}

impl Default for LocationStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("no position within {0:?}")]
    Timeout(Duration),
}

/// A device position source.
pub trait GeolocationProvider: Send + Sync {
    fn current_position(&self)
        -> impl Future<Output = Result<Coordinates, GeolocationError>> + Send;
}

/// A provider that always reports the same position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedLocation(pub Coordinates);

impl GeolocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Ok(self.0)
    }
}

/// Called when the buyer location cannot be resolved.
pub trait CartClearer {
    fn clear_cart(&self);
}

/// Asks `provider` for a position once and publishes it to `store`.
///
/// On failure, denial or timeout the cart is cleared and the store keeps its
/// previous value. There is no retry.
///
/// # Errors
///
/// Returns the provider's [`GeolocationError`], or
/// [`GeolocationError::Timeout`] if no answer arrives within `timeout`.
pub async fn resolve_location_once<P, C>(
    provider: &P,
    store: &LocationStore,
    cart: &C,
    timeout: Duration,
) -> Result<Coordinates, GeolocationError>
where
    P: GeolocationProvider,
    C: CartClearer + ?Sized,
{
    let result = match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(GeolocationError::Timeout(timeout)),
    };

    match result {
        Ok(position) => {
            let changed = store.set(position);
            tracing::info!(location = %position, changed, "buyer location resolved");
            Ok(position)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve buyer location; clearing cart");
            cart.clear_cart();
            Err(e)
        }
    }
}
