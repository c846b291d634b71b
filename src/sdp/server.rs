//! Local service record database
//!
//! [`ServiceDatabase`] is what profile lookups run against. It is implemented
//! by the local [`SdpServer`] and by a plain slice of records, which is how
//! the records retrieved from a peer are handed in.

use super::record::{MAX_SERVICE_RECORDS, ServiceUuid};
use super::{SdpError, ServiceClassId, ServiceRecord, ServiceRecordHandle};
use heapless::{FnvIndexMap, Vec};

/// Handle of the record describing the SDP server itself
const SDP_SERVER_HANDLE: ServiceRecordHandle = 0x0000;

/// A collection of service records that can be searched
pub trait ServiceDatabase {
    /// All records, in registration order
    fn service_records(&self) -> impl Iterator<Item = &ServiceRecord>;

    /// First record listing a service class
    fn find_service(&self, service_class: ServiceClassId) -> Option<&ServiceRecord> {
        self.service_records()
            .find(|record| record.matches_service_class(service_class))
    }
}

impl ServiceDatabase for [ServiceRecord] {
    fn service_records(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.iter()
    }
}

/// Records this device advertises, keyed by handle
#[derive(Debug)]
pub struct SdpServer {
    records: FnvIndexMap<ServiceRecordHandle, ServiceRecord, MAX_SERVICE_RECORDS>,
}

impl SdpServer {
    /// Database holding only the SDP server's own record
    #[must_use]
    pub fn new() -> Self {
        let mut server = Self {
            records: FnvIndexMap::new(),
        };
        // An empty database has room for it and the name fits
        server.register_self().ok();
        server
    }

    fn register_self(&mut self) -> Result<(), SdpError> {
        let mut record = ServiceRecord::new(SDP_SERVER_HANDLE, ServiceClassId::ServiceDiscoveryServer);
        record.set_service_name("SDP Server")?;
        record.add_l2cap_protocol(super::SDP_PSM)?;
        self.add_service_record(record).map(drop)
    }

    /// Register a record under its own handle
    ///
    /// # Errors
    /// `DuplicateHandle` if the handle is taken, `TooManyServices` if the
    /// database is full.
    pub fn add_service_record(
        &mut self,
        record: ServiceRecord,
    ) -> Result<ServiceRecordHandle, SdpError> {
        let handle = record.handle;
        if self.records.contains_key(&handle) {
            return Err(SdpError::DuplicateHandle);
        }
        self.records
            .insert(handle, record)
            .map_err(|_| SdpError::TooManyServices)?;

        debug!("[SDP] Registered service record {}", handle);
        Ok(handle)
    }

    /// Withdraw a record
    pub fn remove_service_record(&mut self, handle: ServiceRecordHandle) -> Option<ServiceRecord> {
        let removed = self.records.remove(&handle);
        if removed.is_some() {
            debug!("[SDP] Removed service record {}", handle);
        }
        removed
    }

    /// Record registered under `handle`
    #[must_use]
    pub fn get_service_record(&self, handle: ServiceRecordHandle) -> Option<&ServiceRecord> {
        self.records.get(&handle)
    }

    /// Handles of the records matching any of `service_uuids`
    ///
    /// An empty pattern matches every record.
    #[must_use]
    pub fn search_services(
        &self,
        service_uuids: &[ServiceUuid],
    ) -> Vec<ServiceRecordHandle, MAX_SERVICE_RECORDS> {
        self.records
            .values()
            .filter(|record| {
                service_uuids.is_empty() || service_uuids.iter().any(|&uuid| record.matches_uuid(uuid))
            })
            .map(|record| record.handle)
            .collect()
    }

    /// Number of registered records, the server's own included
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for SdpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDatabase for SdpServer {
    fn service_records(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_server_lists_itself() {
        let server = SdpServer::new();
        assert_eq!(server.service_count(), 1);
        let record = server.get_service_record(SDP_SERVER_HANDLE).unwrap();
        assert!(record.matches_service_class(ServiceClassId::ServiceDiscoveryServer));
    }

    #[test]
    fn test_register_and_withdraw() {
        let mut server = SdpServer::new();

        let handle = server
            .add_service_record(ServiceRecord::new(0x10000, ServiceClassId::HandsFree))
            .unwrap();
        assert_eq!(handle, 0x10000);
        assert_eq!(server.service_count(), 2);

        assert_eq!(
            server
                .add_service_record(ServiceRecord::new(
                    0x10000,
                    ServiceClassId::HandsFreeAudioGateway
                ))
                .err(),
            Some(SdpError::DuplicateHandle)
        );
        // The first registration is untouched
        assert!(
            server
                .get_service_record(handle)
                .unwrap()
                .matches_service_class(ServiceClassId::HandsFree)
        );

        assert!(server.remove_service_record(handle).is_some());
        assert!(server.remove_service_record(handle).is_none());
        assert_eq!(server.service_count(), 1);
    }

    #[test]
    fn test_database_full() {
        let mut server = SdpServer::new();
        for handle in 1..MAX_SERVICE_RECORDS as u32 {
            server
                .add_service_record(ServiceRecord::new(handle, ServiceClassId::GenericAudio))
                .unwrap();
        }
        assert_eq!(
            server.add_service_record(ServiceRecord::new(0x20000, ServiceClassId::GenericAudio)),
            Err(SdpError::TooManyServices)
        );
    }

    #[test]
    fn test_search_by_class() {
        let mut server = SdpServer::new();
        server
            .add_service_record(ServiceRecord::new(0x10001, ServiceClassId::HandsFree))
            .unwrap();
        server
            .add_service_record(ServiceRecord::new(
                0x10002,
                ServiceClassId::HandsFreeAudioGateway,
            ))
            .unwrap();

        let found = server.search_services(&[ServiceClassId::HandsFree.to_uuid()]);
        assert_eq!(found.as_slice(), &[0x10001]);

        let found = server.search_services(&[
            ServiceClassId::HandsFree.to_uuid(),
            ServiceClassId::HandsFreeAudioGateway.to_uuid(),
        ]);
        assert_eq!(found.len(), 2);

        assert_eq!(server.search_services(&[]).len(), 3);
    }

    #[test]
    fn test_find_service() {
        let mut server = SdpServer::new();
        server
            .add_service_record(ServiceRecord::new(0x10001, ServiceClassId::HandsFree))
            .unwrap();

        let found = server.find_service(ServiceClassId::HandsFree).unwrap();
        assert_eq!(found.handle, 0x10001);
        assert!(server.find_service(ServiceClassId::HandsFreeAudioGateway).is_none());

        let peer = [ServiceRecord::new(0x20000, ServiceClassId::HandsFreeAudioGateway)];
        let found = peer[..]
            .find_service(ServiceClassId::HandsFreeAudioGateway)
            .unwrap();
        assert_eq!(found.handle, 0x20000);
    }
}
