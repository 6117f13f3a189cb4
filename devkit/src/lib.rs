/*!
# RabbitMQ DevKit - test doubles for the agent

Lets the agent be exercised without a running broker:
- A local HTTP stub answering management API paths with canned JSON
- JSON fixtures shaped like real management API records
*/

pub mod api_stub;
pub mod fixtures;

pub use api_stub::{MockManagementApi, RecordedRequest};
