//! Choosing which hub to talk to.
//!
//! An address given on the command line always wins.  Otherwise the last
//! saved address is used.  A scan that finds exactly one hub saves it, so
//! the usual first run is `movehub scan` followed by plain `movehub run`.
//! When several hubs answer, the operator picks one by its list index.

use thiserror::Error;
use tracing::info;

use crate::application::transport::DiscoveredHub;

#[derive(Debug, Error)]
#[error("failed to save hub address: {0}")]
pub struct StoreError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

/// Where the last-used hub address is remembered.
#[cfg_attr(test, mockall::automock)]
pub trait AddressStore: Send {
    fn get(&self) -> Option<String>;

    fn set(&mut self, address: &str, name: Option<String>) -> Result<(), StoreError>;
}

/// Picks the address to connect to.
pub fn resolve_address(explicit: Option<&str>, store: &dyn AddressStore) -> Option<String> {
    explicit.map(str::to_string).or_else(|| store.get())
}

/// Saves the hub if the scan found exactly one, or the hub at `choice` if
/// it found several.  Returns the saved hub.
///
/// `choice` is ignored for a single result.  A missing or out-of-range
/// choice saves nothing.
///
/// # Errors
///
/// Propagates the store's error if saving fails.
pub fn remember_scan_result<'a>(
    hubs: &'a [DiscoveredHub],
    choice: Option<usize>,
    store: &mut dyn AddressStore,
) -> Result<Option<&'a DiscoveredHub>, StoreError> {
    let picked = match hubs {
        [] => None,
        [only] => Some(only),
        _ => choice.and_then(|i| hubs.get(i)),
    };
    let Some(hub) = picked else {
        return Ok(None);
    };
    store.set(&hub.address, hub.name.clone())?;
    info!(address = %hub.address, "remembered hub");
    Ok(Some(hub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(address: &str) -> DiscoveredHub {
        DiscoveredHub {
            address: address.to_string(),
            name: Some("Technic Move".to_string()),
            rssi: Some(-60),
        }
    }

    #[test]
    fn test_explicit_address_wins_over_saved() {
        // Arrange
        let mut store = MockAddressStore::new();
        store.expect_get().never();

        // Act
        let address = resolve_address(Some("AA:BB"), &store);

        // Assert
        assert_eq!(address.as_deref(), Some("AA:BB"));
    }

    #[test]
    fn test_falls_back_to_saved_address() {
        let mut store = MockAddressStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|| Some("11:22".to_string()));

        assert_eq!(resolve_address(None, &store).as_deref(), Some("11:22"));
    }

    #[test]
    fn test_no_address_anywhere() {
        let mut store = MockAddressStore::new();
        store.expect_get().returning(|| None);
        assert_eq!(resolve_address(None, &store), None);
    }

    #[test]
    fn test_single_scan_result_is_saved() {
        // Arrange
        let mut store = MockAddressStore::new();
        store
            .expect_set()
            .withf(|address, name| {
                address.to_string() == "AA:BB" && name.as_deref() == Some("Technic Move")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let hubs = vec![hub("AA:BB")];

        // Act
        let saved = remember_scan_result(&hubs, None, &mut store).unwrap();

        // Assert
        assert_eq!(saved, Some(&hubs[0]));
    }

    #[test]
    fn test_zero_results_or_no_choice_are_not_saved() {
        let mut store = MockAddressStore::new();
        store.expect_set().never();

        assert_eq!(remember_scan_result(&[], Some(0), &mut store).unwrap(), None);
        let two = vec![hub("AA"), hub("BB")];
        assert_eq!(remember_scan_result(&two, None, &mut store).unwrap(), None);
        assert_eq!(remember_scan_result(&two, Some(2), &mut store).unwrap(), None);
    }

    #[test]
    fn test_chosen_hub_is_saved_from_several() {
        // Arrange
        let mut store = MockAddressStore::new();
        store
            .expect_set()
            .withf(|address, _| address == "BB")
            .times(1)
            .returning(|_, _| Ok(()));
        let two = vec![hub("AA"), hub("BB")];

        // Act
        let saved = remember_scan_result(&two, Some(1), &mut store).unwrap();

        // Assert
        assert_eq!(saved, Some(&two[1]));
    }

    #[test]
    fn test_store_failure_is_propagated() {
        let mut store = MockAddressStore::new();
        store.expect_set().returning(|_, _| {
            Err(StoreError(Box::new(std::io::Error::other("disk full"))))
        });

        assert!(remember_scan_result(&[hub("AA")], None, &mut store).is_err());
    }
}
