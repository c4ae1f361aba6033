//! Crate to build and query customizable contraction hierarchies.
//!
//! The preprocessing is split in two: [`build_structure`] computes the
//! weight-independent elimination structure for a node order, and
//! [`customize`] folds a concrete weight vector into it. Queries run
//! against the customized [`Metric`]; small weight changes go through
//! the [`PartialUpdater`] without redoing the full customization.
//!
//! # Basic usage
//! ```
//! use std::sync::Arc;
//!
//! use cch_core::{
//!     contraction::build_structure,
//!     customization::customize,
//!     graph::node_index,
//!     ordering::compute_order,
//!     search::query::CchQuery,
//! };
//!
//! // Arcs of a directed line 0 -> 1 -> 2 -> 3.
//! let tail = vec![0, 1, 2];
//! let head = vec![1, 2, 3];
//!
//! let order = compute_order(4, &tail, &head).unwrap();
//! let structure = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
//! let metric = customize(structure, vec![10.0, 5.0, 7.0]).unwrap();
//!
//! let mut query = CchQuery::new(&metric);
//! let sp = query.run(node_index(0), node_index(3)).unwrap().unwrap();
//! assert_eq!(sp.weight, 22.0);
//! ```
//!
//! [`build_structure`]: crate::contraction::build_structure
//! [`customize`]: crate::customization::customize
//! [`Metric`]: crate::customization::Metric
//! [`PartialUpdater`]: crate::partial::PartialUpdater
pub mod constants;
pub mod contraction;
pub mod customization;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod ordering;
pub mod partial;
pub mod search;
pub mod statistics;
pub mod util;
