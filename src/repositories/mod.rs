//! Persistence collaborators injected into the post service.
//!
//! `PostRepository` owns the post document and its image/pet link tables;
//! `PetRepository` and `UserRepository` are read-only lookups over entities
//! managed elsewhere in the application.

pub mod pet_repository;
pub mod post_repository;
pub mod user_repository;

pub use pet_repository::PetRepository;
pub use post_repository::PostRepository;
pub use user_repository::UserRepository;
