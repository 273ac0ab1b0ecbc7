//! Integration tests for nodedb

mod backend_contract;
mod cli_contracts;
