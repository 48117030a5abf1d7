// Google infra layer.
// - `auth.rs` exchanges service-account credentials for access tokens.
// - `drive_client.rs` lists spreadsheet files via the Drive API.
// - `sheets_client.rs` fetches one column via the Sheets API.

#[path = "auth.rs"]
pub mod auth;

#[path = "drive_client.rs"]
pub mod drive_client;

#[path = "sheets_client.rs"]
pub mod sheets_client;

pub use auth::ServiceAccountAuth;
pub use drive_client::DriveApiClient;
pub use sheets_client::SheetsApiClient;
