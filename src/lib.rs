//! Workspace-level tooling package (pre-commit hooks via rusty-hook). Intentionally empty.
