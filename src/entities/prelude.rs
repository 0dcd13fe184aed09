pub use super::upload_sessions::Entity as UploadSessions;
