// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod actions;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod kubernetes;
pub mod leader;
pub mod reconcilers;
pub mod server;
pub mod types;

#[cfg(test)]
pub mod test_utils;
