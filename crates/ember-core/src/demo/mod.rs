// SPDX-License-Identifier: Apache-2.0
//! Demo layer implementations showcasing the layer contract.
//!
//! These are real, wired implementations used by the integration suite as
//! a vertical slice; gameplay-complete layers live with the host.

pub mod progress;
