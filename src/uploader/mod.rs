// Uploader module - coordinates API definition uploads to a Yapi server

pub mod progress_tracker;
pub mod upload_batch;
pub mod yapi_client;

pub use upload_batch::process_upload_batch;
pub use yapi_client::{YapiClient, YapiUploader};
