//! Path selection policy
//!
//! The bandit decides which outgoing link to follow at each node. See
//! `bandit.rs` for the UCB1 rule and the arm table it reads.

pub mod bandit;

pub use bandit::{best_path, ArmStats, ArmTable, BanditSelector, SelectedPath};
