pub mod db;
pub mod ffmpeg;
pub mod notify;
