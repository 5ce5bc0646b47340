pub mod models;
pub mod notes;

pub use notes::NoteStore;
