//! Hypermedia projection of a hierarchical, versioned content repository.
//!
//! This crate turns repository items (nodes, properties, mixins, versions)
//! into linked JSON representations and offers uniform read/create/delete
//! over each node's sub-element containers. It is the library behind the
//! `repolink-server` HTTP front end.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`names`] | Escaping of repository names into URI segments |
//! | [`uri`] | Canonical URIs: by identifier, by path, of node types |
//! | [`representation`] | [`NodeRepresentation`], [`PropertyRepresentation`], [`MixinRepresentation`] and the link [`Decorator`] |
//! | [`accessor`] | [`ElementAccessor`] strategies for `properties`, `children`, `mixins`, `versions` |
//! | [`repository`] | The [`Session`] / [`Repository`] contract and an in-memory implementation |
//! | [`config`] | [`LinkOptions`] and per-request overrides |
//! | [`error`] | [`ProjectionError`] and [`RepositoryError`] |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use repolink::{AllowAll, LinkOptions, NodeRepresentation, Projection, SessionGuard};
//! use repolink::repository::memory::MemoryRepository;
//!
//! let repository = MemoryRepository::new();
//! let session = SessionGuard::open(&repository)?;
//! let ctx = Projection::new(&*session, &AllowAll, LinkOptions::default(), "http://localhost:8080");
//!
//! let root = session.root_node()?;
//! let json = serde_json::to_string_pretty(&NodeRepresentation::build(&ctx, &root, 1)?)?;
//! ```

pub mod accessor;
pub mod config;
pub mod error;
pub mod names;
pub mod projection;
pub mod repository;
pub mod representation;
pub mod uri;

pub use accessor::{accessor_for, Element, ElementAccessor, Operation, Outcome, SubElementContainer, SubElementKind};
pub use config::{LinkOptions, OptionOverrides};
pub use error::{ProjectionError, RepositoryError, Result};
pub use projection::Projection;
pub use repository::{AllowAll, PermissionCheck, Repository, Session, SessionGuard};
pub use representation::{
    Decorator, Href, Link, MixinRepresentation, NodeRepresentation, OrderedMap, PropertyRepresentation,
};
