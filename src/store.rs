//! File-backed database.
//!
//! Layout under the data directory:
//!
//! ```text
//! users.json              email -> User
//! files.json              [UploadedFile]
//! datasets/<id>.bin.gz    parsed workbook for file <id>
//! ```

use chrono::NaiveDateTime;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::model::{FileDataset, UploadedFile, User};
use crate::saving;

const USERS_FILE: &str = "users.json";
const FILES_FILE: &str = "files.json";
const DATASETS_DIR: &str = "datasets";

/// Fields collected by the registration form.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

pub struct Store {
    root: PathBuf,
    // Serializes read-modify-write cycles on the JSON files
    lock: Mutex<()>,
}

impl Store {
    /// Open (creating if needed) the database rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(DATASETS_DIR))?;

        let users = root.join(USERS_FILE);
        if !users.exists() {
            fs::write(&users, b"{}")?;
        }
        let files = root.join(FILES_FILE);
        if !files.exists() {
            fs::write(&files, b"[]")?;
        }

        Ok(Store {
            root,
            lock: Mutex::new(()),
        })
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let data = fs::read_to_string(self.root.join(name))?;
        Ok(serde_json::from_str(&data)?)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(self.root.join(name), json)?;
        Ok(())
    }

    fn users(&self) -> Result<HashMap<String, User>> {
        self.read_json(USERS_FILE)
    }

    fn files(&self) -> Result<Vec<UploadedFile>> {
        self.read_json(FILES_FILE)
    }

    /// Add a user. Fails when the email is already registered.
    pub fn insert_user(&self, new_user: NewUser) -> Result<User> {
        let _guard = self.lock.lock().unwrap();
        let mut users = self.users()?;
        if users.contains_key(&new_user.email) {
            return Err(AppError::Auth("Email address is already registered".into()));
        }

        let id = users.values().map(|user| user.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            password_hash: new_user.password_hash,
        };
        users.insert(user.email.clone(), user.clone());
        self.write_json(USERS_FILE, &users)?;
        Ok(user)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users()?.remove(email))
    }

    pub fn user(&self, id: u64) -> Result<Option<User>> {
        Ok(self.users()?.into_values().find(|user| user.id == id))
    }

    pub fn update_user_name(&self, id: u64, first_name: &str, last_name: &str) -> Result<User> {
        let _guard = self.lock.lock().unwrap();
        let mut users = self.users()?;
        let user = users
            .values_mut()
            .find(|user| user.id == id)
            .ok_or_else(|| AppError::Auth("User not found".into()))?;
        user.first_name = first_name.to_string();
        user.last_name = last_name.to_string();
        let updated = user.clone();
        self.write_json(USERS_FILE, &users)?;
        Ok(updated)
    }

    /// Record a newly uploaded file and return it with its assigned id.
    ///
    /// # Arguments
    /// * `user_id` - Owner of the upload
    /// * `filename` - Sanitised name shown in the registry
    /// * `size_kb` - Upload size in kilobytes
    /// * `upload_date` - When the upload finished, UTC
    ///
    /// # Returns
    /// * `Result<UploadedFile>` - The stored record, ids counting up from 1
    pub fn add_file(
        &self,
        user_id: u64,
        filename: &str,
        size_kb: f64,
        upload_date: NaiveDateTime,
    ) -> Result<UploadedFile> {
        let _guard = self.lock.lock().unwrap();
        let mut files = self.files()?;
        let id = files.iter().map(|file| file.id).max().unwrap_or(0) + 1;
        let file = UploadedFile {
            id,
            filename: filename.to_string(),
            size: size_kb,
            upload_date,
            user_id,
        };
        files.push(file.clone());
        self.write_json(FILES_FILE, &files)?;
        Ok(file)
    }

    pub fn file(&self, id: u64) -> Result<Option<UploadedFile>> {
        Ok(self.files()?.into_iter().find(|file| file.id == id))
    }

    /// Files owned by `user_id`, in upload order.
    pub fn files_for_user(&self, user_id: u64) -> Result<Vec<UploadedFile>> {
        let mut files: Vec<UploadedFile> = self
            .files()?
            .into_iter()
            .filter(|file| file.user_id == user_id)
            .collect();
        files.sort_by_key(|file| file.id);
        Ok(files)
    }

    /// Delete a file record together with its parsed data.
    pub fn remove_file(&self, id: u64) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut files = self.files()?;
        let before = files.len();
        files.retain(|file| file.id != id);
        if files.len() == before {
            return Err(AppError::FileNotFound(id));
        }
        self.write_json(FILES_FILE, &files)?;

        let dataset = self.dataset_path(id);
        if dataset.exists() {
            fs::remove_file(dataset)?;
        }
        Ok(())
    }

    fn dataset_path(&self, id: u64) -> PathBuf {
        self.root.join(DATASETS_DIR).join(format!("{}.bin.gz", id))
    }

    pub fn save_dataset(&self, id: u64, dataset: &FileDataset) -> Result<()> {
        saving::write_dataset(dataset, &self.dataset_path(id))
    }

    /// Parsed data for file `id`; empty when the file was never parsed.
    pub fn load_dataset(&self, id: u64) -> Result<FileDataset> {
        let path = self.dataset_path(id);
        if !path.exists() {
            return Ok(FileDataset::default());
        }
        saving::read_dataset(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SummaryRow;
    use chrono::NaiveDate;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Lan".into(),
            last_name: "Nguyen".into(),
            email: email.into(),
            password_hash: "hash".into(),
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn users_get_sequential_ids_and_unique_emails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let first = store.insert_user(new_user("a@example.com")).unwrap();
        let second = store.insert_user(new_user("b@example.com")).unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(store.insert_user(new_user("a@example.com")).is_err());

        let found = store.user_by_email("b@example.com").unwrap().unwrap();
        assert_eq!(found.id, 2);
        assert_eq!(store.user(1).unwrap().unwrap().email, "a@example.com");
    }

    #[test]
    fn profile_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let user = store.insert_user(new_user("a@example.com")).unwrap();

        store.update_user_name(user.id, "Minh", "Tran").unwrap();
        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.user(user.id).unwrap().unwrap().full_name(), "Minh Tran");
    }

    #[test]
    fn files_are_scoped_to_their_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.add_file(1, "a.xlsx", 1.0, noon()).unwrap();
        store.add_file(2, "b.pdf", 2.0, noon()).unwrap();
        store.add_file(1, "c.xls", 3.0, noon()).unwrap();

        let names: Vec<String> = store
            .files_for_user(1)
            .unwrap()
            .into_iter()
            .map(|file| file.filename)
            .collect();
        assert_eq!(names, vec!["a.xlsx", "c.xls"]);
    }

    #[test]
    fn removing_a_file_drops_its_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let file = store.add_file(1, "a.xlsx", 1.0, noon()).unwrap();

        let dataset = FileDataset {
            summary_rows: vec![SummaryRow {
                row_label: "Total".into(),
                ..SummaryRow::default()
            }],
            ..FileDataset::default()
        };
        store.save_dataset(file.id, &dataset).unwrap();
        assert_eq!(store.load_dataset(file.id).unwrap(), dataset);

        store.remove_file(file.id).unwrap();
        assert!(store.file(file.id).unwrap().is_none());
        assert_eq!(store.load_dataset(file.id).unwrap(), FileDataset::default());
        assert!(matches!(store.remove_file(file.id), Err(AppError::FileNotFound(_))));
    }
}
