//! Operational-status addressing

/// Which part of the station an operational status applies to.
///
/// Mirrors the OCPP addressing convention: `evse_id = 0` is the whole
/// station, `connector_id = 0` is a whole EVSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentScope {
    Station,
    Evse(i32),
    Connector(i32, i32),
}

impl ComponentScope {
    pub fn ids(&self) -> (i32, i32) {
        match *self {
            ComponentScope::Station => (0, 0),
            ComponentScope::Evse(evse_id) => (evse_id, 0),
            ComponentScope::Connector(evse_id, connector_id) => (evse_id, connector_id),
        }
    }

    pub fn from_ids(evse_id: i32, connector_id: i32) -> Self {
        match (evse_id, connector_id) {
            (0, _) => ComponentScope::Station,
            (e, 0) => ComponentScope::Evse(e),
            (e, c) => ComponentScope::Connector(e, c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip() {
        for scope in [
            ComponentScope::Station,
            ComponentScope::Evse(2),
            ComponentScope::Connector(1, 3),
        ] {
            let (e, c) = scope.ids();
            assert_eq!(ComponentScope::from_ids(e, c), scope);
        }
    }
}
