mod common;

mod pg_store_tests;
mod policy_tests;
mod provider_tests;
