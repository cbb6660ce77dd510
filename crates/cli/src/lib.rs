// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Subcommands of `rulectl`, a command line tool for checking and trying out access rules
//! against JSON schema and record files.

pub mod commands;
pub mod loader;
