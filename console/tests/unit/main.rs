mod common;
mod test_deploy_stage;
mod test_http_client;
mod test_monitor_stage;
