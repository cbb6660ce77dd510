// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod compare;
mod timestamp;
mod val;

pub use compare::{
    compare_values, eq_values, gt_values, gte_values, lt_values, lte_values, neq_values,
};
pub use timestamp::format_timestamp;
pub use val::{Val, ValNumber};
