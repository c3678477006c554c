//! Concrete HTTP adapters for the collaborator traits in
//! [`crate::services`], and credential resolution.

pub mod google;
pub mod keys;
pub mod nominatim;
