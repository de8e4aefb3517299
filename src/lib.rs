//! Newsdesk - admin panel backend for a multilingual news site
//!
//! Staff sign in with a mailed one-time code and manage authors,
//! categories and news items written in English, Hindi and Urdu.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod storage;
