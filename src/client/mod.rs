//! Data layer for gallery front ends: talking to the API, local post state,
//! and debounced client-side search. Rendering is left to the caller.

mod api;
mod debounce;
mod search;

pub use api::{ClientError, GalleryClient};
pub use debounce::{Debouncer, SEARCH_DEBOUNCE};
pub use search::{filter_posts, DebouncedSearch, Gallery, SearchResults};
