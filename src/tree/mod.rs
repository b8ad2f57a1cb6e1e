//! Virtual file tree
//!
//! Directory and file nodes addressed by `/{app}/folders/{scope}/...` paths.
//! Every directory carries a fingerprint of its live children, so any change
//! below it is visible at each ancestor up to the top-level node.

pub mod hasher;
pub mod node;
pub mod nodes;
pub mod path;
pub mod propagate;
pub mod resolver;
pub mod store;
pub mod walker;

pub use node::{Lifecycle, NodeProperties, NodeProperty, NodeType, NotificationSetting, PropertyKey, TreeNode};
pub use path::{Scope, VirtualPath};
pub use store::{TreeNodeStore, WriteMode, WriteOutcome};
