pub mod firestore;
pub mod images;

pub use firestore::{
    FilterOp, FirestoreClient, QueryFilter, RemoteDocument, RemoteDocumentStore,
    from_firestore_value, to_firestore_value,
};
pub use images::{ImageSearchProvider, UnsplashImageSearch, WikipediaImageSearch};
