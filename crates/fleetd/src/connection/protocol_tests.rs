// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

#[test]
fn parses_minimal_report() -> anyhow::Result<()> {
    let id = InstanceId::new_v4();
    let msg: AgentToServer = serde_json::from_value(json!({ "instance_uid": id.to_string() }))?;
    assert_eq!(msg.instance_uid, id);
    assert_eq!(msg.sequence_num, 0);
    assert!(msg.status.is_null());
    assert!(msg.applied_config_hash().is_none());
    Ok(())
}

#[test]
fn extracts_applied_config_hash() -> anyhow::Result<()> {
    let msg: AgentToServer = serde_json::from_value(json!({
        "instance_uid": InstanceId::new_v4().to_string(),
        "sequence_num": 7,
        "status": { "remote_config_status": { "last_remote_config_hash": "abc" } }
    }))?;
    assert_eq!(msg.sequence_num, 7);
    assert_eq!(msg.applied_config_hash(), Some("abc"));
    Ok(())
}

#[test]
fn rejects_malformed_instance_uid() {
    let result = serde_json::from_value::<AgentToServer>(json!({ "instance_uid": "nope" }));
    assert!(result.is_err());
}

#[test]
fn remote_config_command_carries_hash_and_omits_settings() -> anyhow::Result<()> {
    let id = InstanceId::new_v4();
    let config = AgentConfigMap::from_body("a: b");
    let msg = ServerToAgent::from_command(id, Command::RemoteConfig(config.clone()));

    let value = serde_json::to_value(&msg)?;
    assert_eq!(value["instance_uid"], id.to_string());
    assert_eq!(value["remote_config"]["config_hash"], config.config_hash());
    assert_eq!(value["remote_config"]["config"]["config_map"][""]["body"], "a: b");
    assert!(value.get("connection_settings").is_none());
    Ok(())
}
