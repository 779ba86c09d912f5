//! File-backed store using sharded JSON directories.
//!
//! ## Storage layout
//!
//! ```text
//! <data_dir>/
//!   access/
//!     <s1>/<s2>/<request_id>/request.json
//!   records/
//!     <s1>/<s2>/<patient_ref>/<entry_id>.json
//! ```
//!
//! where `s1`/`s2` are the first four hex characters of the identifier,
//! keeping directory fan-out bounded. Requests shard by their own id;
//! record entries shard by the owning patient so one patient's entries sit
//! together.
//!
//! Listing walks the sharded tree and parses every JSON leaf; unreadable
//! files are logged and skipped so one corrupt row cannot take the whole
//! listing down. Writes are serialised behind a store-level mutex, which is
//! what makes `insert`'s uniqueness check and `transition`'s compare-and-set
//! atomic with respect to each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use medipass_ids::{DoctorRef, PatientRef, RequestId};

use crate::entry::MedicalRecordEntry;
use crate::request::{AccessRequest, AccessStatus};
use crate::store::{AccessRequestStore, RecordEntryStore, StoreError, StoreResult};

const REQUEST_FILE_NAME: &str = "request.json";
const ACCESS_DIR_NAME: &str = "access";
const RECORDS_DIR_NAME: &str = "records";

/// Sharded-JSON implementation of both store traits.
pub struct FsStore {
    access_dir: PathBuf,
    records_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsStore {
    /// Opens (and creates if needed) the store under `data_dir`.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let access_dir = data_dir.join(ACCESS_DIR_NAME);
        let records_dir = data_dir.join(RECORDS_DIR_NAME);
        fs::create_dir_all(&access_dir).map_err(io_error)?;
        fs::create_dir_all(&records_dir).map_err(io_error)?;

        Ok(Self {
            access_dir,
            records_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn request_file(&self, id: &RequestId) -> PathBuf {
        id.as_ref_id()
            .sharded_dir(&self.access_dir)
            .join(REQUEST_FILE_NAME)
    }

    fn patient_records_dir(&self, patient_ref: &PatientRef) -> PathBuf {
        patient_ref.as_ref_id().sharded_dir(&self.records_dir)
    }

    fn write_request(&self, request: &AccessRequest) -> StoreResult<()> {
        let path = self.request_file(&request.id);
        write_json(&path, request)
    }

    /// Walks the sharded request tree and parses every `request.json`.
    ///
    /// Unparseable leaves are logged and skipped.
    fn scan_requests(&self) -> StoreResult<Vec<AccessRequest>> {
        let mut requests = Vec::new();

        for leaf_dir in walk_sharded_leaves(&self.access_dir)? {
            let file = leaf_dir.join(REQUEST_FILE_NAME);
            if !file.is_file() {
                continue;
            }
            match read_json::<AccessRequest>(&file) {
                Ok(request) => requests.push(request),
                Err(_) => {
                    tracing::warn!("failed to parse access request: {}", file.display());
                }
            }
        }

        Ok(requests)
    }
}

impl AccessRequestStore for FsStore {
    fn insert(&self, request: AccessRequest) -> StoreResult<AccessRequest> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;

        let existing = self
            .scan_requests()?
            .into_iter()
            .any(|candidate| {
                candidate.patient_ref == request.patient_ref
                    && candidate.doctor_ref == request.doctor_ref
                    && candidate.is_active_at(request.requested_at)
            });
        if existing {
            return Err(StoreError::ActiveRequestExists);
        }

        self.write_request(&request)?;
        Ok(request)
    }

    fn get(&self, id: &RequestId) -> StoreResult<AccessRequest> {
        let file = self.request_file(id);
        if !file.is_file() {
            return Err(StoreError::NotFound);
        }
        read_json(&file)
    }

    fn find_active_for_pair(
        &self,
        patient_ref: &PatientRef,
        doctor_ref: &DoctorRef,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AccessRequest>> {
        Ok(self.scan_requests()?.into_iter().find(|req| {
            req.patient_ref == *patient_ref
                && req.doctor_ref == *doctor_ref
                && req.is_active_at(now)
        }))
    }

    fn transition(
        &self,
        id: &RequestId,
        expected: AccessStatus,
        next: AccessStatus,
        responded_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<AccessRequest> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;

        let mut request = self.get(id)?;
        if request.status != expected {
            return Err(StoreError::StatusMismatch {
                actual: request.status,
            });
        }

        request.status = next;
        if responded_at.is_some() {
            request.responded_at = responded_at;
        }
        if expires_at.is_some() {
            request.expires_at = expires_at;
        }

        self.write_request(&request)?;
        Ok(request)
    }

    fn list_for_doctor(&self, doctor_ref: &DoctorRef) -> StoreResult<Vec<AccessRequest>> {
        Ok(self
            .scan_requests()?
            .into_iter()
            .filter(|req| req.doctor_ref == *doctor_ref)
            .collect())
    }

    fn list_for_patient(&self, patient_ref: &PatientRef) -> StoreResult<Vec<AccessRequest>> {
        Ok(self
            .scan_requests()?
            .into_iter()
            .filter(|req| req.patient_ref == *patient_ref)
            .collect())
    }
}

impl RecordEntryStore for FsStore {
    fn append(&self, entry: MedicalRecordEntry) -> StoreResult<MedicalRecordEntry> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        let path = self
            .patient_records_dir(&entry.patient_ref)
            .join(format!("{}.json", entry.id));
        write_json(&path, &entry)?;
        Ok(entry)
    }

    fn list_for_patient(
        &self,
        patient_ref: &PatientRef,
    ) -> StoreResult<Vec<MedicalRecordEntry>> {
        let dir = self.patient_records_dir(patient_ref);
        let mut entries = Vec::new();

        let iter = match fs::read_dir(&dir) {
            Ok(iter) => iter,
            // No directory yet simply means no entries yet.
            Err(_) => return Ok(entries),
        };

        for dir_entry in iter.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<MedicalRecordEntry>(&path) {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    tracing::warn!("failed to parse record entry: {}", path.display());
                }
            }
        }

        Ok(entries)
    }
}

fn poisoned() -> StoreError {
    StoreError::Io("store lock poisoned".into())
}

fn io_error(err: std::io::Error) -> StoreError {
    StoreError::Io(err.to_string())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    fs::write(path, json).map_err(io_error)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let contents = fs::read_to_string(path).map_err(io_error)?;
    serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Yields every `<base>/<s1>/<s2>/<id>/` leaf directory.
fn walk_sharded_leaves(base: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut leaves = Vec::new();

    let s1_iter = match fs::read_dir(base) {
        Ok(iter) => iter,
        Err(_) => return Ok(leaves),
    };
    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }

        let s2_iter = match fs::read_dir(&s1_path) {
            Ok(iter) => iter,
            Err(_) => continue,
        };
        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }

            let leaf_iter = match fs::read_dir(&s2_path) {
                Ok(iter) => iter,
                Err(_) => continue,
            };
            for leaf in leaf_iter.flatten() {
                let leaf_path = leaf.path();
                if leaf_path.is_dir() {
                    leaves.push(leaf_path);
                }
            }
        }
    }

    Ok(leaves)
}
