// Copyright (c) 2025 - Stichting Beep
//! Property-Based Tests Module

mod acl_numbering;
mod dependency_order;
mod subnet_allocation;
