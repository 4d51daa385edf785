use crate::error::Error;
use crate::inspector::target::{InspectionTarget, TargetIdentifier, TargetType};
use crate::protocol::{key, TYPE_JAVASCRIPT};
use plist::{Dictionary, Value};

/// Snapshot of target state advertised to the remote client.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub target_identifier: TargetIdentifier,
    pub title: String,
    pub target_type: TargetType,
    /// Present only while a debug session with target is active.
    pub connection_identifier: Option<String>,
}

impl Listing {
    /// Build listing for a target. Return [`None`] if target does not allow remote debugging.
    ///
    /// # Arguments
    ///
    /// * `target`: listed target
    /// * `connection_identifier`: identifier of an active session with target, if any
    pub fn for_target(
        target: &dyn InspectionTarget,
        connection_identifier: Option<&str>,
    ) -> Result<Option<Self>, Error> {
        if !target.remote_debugging_allowed() {
            return Ok(None);
        }

        match target.target_type() {
            TargetType::JavaScript => {}
            unsupported @ TargetType::Web => return Err(Error::UnsupportedTarget(unsupported)),
        }

        Ok(Some(Listing {
            target_identifier: target.target_identifier(),
            title: target.name(),
            target_type: target.target_type(),
            connection_identifier: connection_identifier.map(ToOwned::to_owned),
        }))
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut listing = Dictionary::new();
        listing.insert(
            key::TARGET_IDENTIFIER.to_string(),
            Value::from(self.target_identifier),
        );
        listing.insert(key::TITLE.to_string(), Value::from(self.title.as_str()));
        listing.insert(key::TYPE.to_string(), Value::from(TYPE_JAVASCRIPT));
        if let Some(connection) = &self.connection_identifier {
            listing.insert(
                key::CONNECTION_IDENTIFIER.to_string(),
                Value::from(connection.as_str()),
            );
        }
        listing
    }
}

/// Build payload of a listing broadcast: `{WIRListingKey: {<target id>: <listing>}}`.
pub fn listing_payload<'a>(listings: impl IntoIterator<Item = &'a Listing>) -> Dictionary {
    let mut by_id = Dictionary::new();
    for listing in listings {
        by_id.insert(
            listing.target_identifier.to_string(),
            Value::Dictionary(listing.to_dictionary()),
        );
    }

    let mut payload = Dictionary::new();
    payload.insert(key::LISTING.to_string(), Value::Dictionary(by_id));
    payload
}
