#![doc = "docs-preview-core: core logic library for docs-preview."]

//! This crate contains the data model, collaborator contracts and the preview
//! reconciler for per-pull-request documentation previews.
//! Network and git plumbing live in the `docs-preview` crate; everything here
//! is exercised against in-memory fakes or `mockall` mocks.
//!
//! # Usage
//! Build a [`request::ReconciliationRequest`] from a downloaded artifact, pick a
//! [`store::PreviewStore`] rooted at the preview branch, and call
//! [`reconcile::reconcile`].

pub mod comment;
pub mod contract;
pub mod error;
pub mod reconcile;
pub mod request;
pub mod store;
