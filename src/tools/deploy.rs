// src/tools/deploy.rs
//
// Two-phase guarded deployment. `deploy_plan` computes the nixos-rebuild
// command and a deterministic confirmation token without executing anything;
// `deploy_execute` recomputes the token and refuses unless it matches exactly
// and, for mutating modes, the process-wide allow_mutation flag is set.
// Refusals are structured results (not protocol errors) carrying the expected
// token, so the caller can re-run the plan/execute flow.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::audit::append_audit;
use crate::config::Config;
use crate::exec::{run_command, validate_timeout};

use super::remote::resolve_host;
use super::{arg_u64, require_str};

// ============================================================================
// Modes and tokens
// ============================================================================

/// Modes that change the target system. `test` activates without making the
/// configuration permanent and counts as non-mutating.
const MUTATING_MODES: [&str; 2] = ["switch", "boot"];
const VALID_MODES: [&str; 3] = ["switch", "boot", "test"];

/// Namespace tag mixed into every confirmation token.
const TOKEN_NAMESPACE: &str = "nixtap-deploy";

fn validate_mode(mode: &str) -> Result<(), String> {
    if VALID_MODES.contains(&mode) {
        Ok(())
    } else {
        Err(format!(
            "Invalid mode '{}' (valid modes: {:?})",
            mode, VALID_MODES
        ))
    }
}

pub fn is_mutating(mode: &str) -> bool {
    MUTATING_MODES.contains(&mode)
}

/// Deterministic confirmation token for a {host, mode} pair. Recomputed on
/// every call and compared by exact string equality; never stored.
pub fn confirmation_token(host: &str, mode: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}:{}", TOKEN_NAMESPACE, host, mode, salt));
    let digest = hex::encode(hasher.finalize());
    format!("deploy-{}", &digest[..16])
}

/// The exact command `deploy_execute` would run.
fn deploy_command(host: &str, target: &str, mode: &str) -> Vec<String> {
    vec![
        "nixos-rebuild".to_string(),
        mode.to_string(),
        "--flake".to_string(),
        format!(".#{}", host),
        "--target-host".to_string(),
        target.to_string(),
    ]
}

// ============================================================================
// Tool handlers
// ============================================================================

pub fn tool_deploy_plan(args: &Value, config: &Config) -> Result<Value, String> {
    let host = require_str(args, "host")?;
    let mode = require_str(args, "mode")?;
    validate_mode(mode)?;
    let target = resolve_host(config, host)?;

    let command = deploy_command(host, target, mode);
    let token = confirmation_token(host, mode, &config.confirm_salt);

    tlog!("[deploy] Planned {} of '{}' (mutating: {})", mode, host, is_mutating(mode));
    Ok(json!({
        "host": host,
        "target": target,
        "mode": mode,
        "mutating": is_mutating(mode),
        "command": command.join(" "),
        "confirmationToken": token,
        "mutationAllowed": config.allow_mutation,
    }))
}

pub fn tool_deploy_execute(args: &Value, config: &Config) -> Result<Value, String> {
    let host = require_str(args, "host")?;
    let mode = require_str(args, "mode")?;
    let confirmation = require_str(args, "confirmation")?;
    let timeout = validate_timeout(arg_u64(args, "timeout")?, 1800)?;
    validate_mode(mode)?;
    let target = resolve_host(config, host)?;

    let expected = confirmation_token(host, mode, &config.confirm_salt);

    let refusal = |reason: &str| {
        json!({
            "executed": false,
            "host": host,
            "mode": mode,
            "reason": reason,
            "expectedToken": expected.clone(),
            "mutationAllowed": config.allow_mutation,
        })
    };

    if is_mutating(mode) && !config.allow_mutation {
        tlog!("[deploy] Refused {} of '{}': mutation not allowed", mode, host);
        return Ok(refusal(
            "Mutating deploy refused: allow_mutation is disabled in the server config",
        ));
    }
    if confirmation != expected {
        tlog!("[deploy] Refused {} of '{}': confirmation token mismatch", mode, host);
        return Ok(refusal(
            "Confirmation token mismatch: call deploy_plan and pass its token back unchanged",
        ));
    }

    let command = deploy_command(host, target, mode);
    tlog!("[deploy] Executing {} of '{}'", mode, host);
    let result = run_command(&command, &config.flake_root, timeout)?;

    append_audit(
        &config.audit_log_path(),
        "deploy_execute",
        json!({
            "host": host,
            "mode": mode,
            "exitCode": result.exit_code,
            "durationMs": result.duration_ms,
        }),
    );

    Ok(json!({
        "executed": true,
        "host": host,
        "mode": mode,
        "command": result.command.join(" "),
        "exitCode": result.exit_code,
        "success": result.success(),
        "durationMs": result.duration_ms,
        "stdout": result.stdout,
        "stderr": result.stderr,
    }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(allow_mutation: bool) -> Config {
        let mut config = Config::default();
        config
            .hosts
            .insert("router".to_string(), "admin@10.0.0.1".to_string());
        config.allow_mutation = allow_mutation;
        config.confirm_salt = "test-salt".to_string();
        config
    }

    #[test]
    fn test_token_is_deterministic() {
        let a = confirmation_token("router", "switch", "s");
        let b = confirmation_token("router", "switch", "s");
        assert_eq!(a, b);
        assert!(a.starts_with("deploy-"));
        assert_eq!(a.len(), "deploy-".len() + 16);
    }

    #[test]
    fn test_token_varies_with_inputs() {
        let base = confirmation_token("router", "switch", "s");
        assert_ne!(base, confirmation_token("router", "boot", "s"));
        assert_ne!(base, confirmation_token("nas", "switch", "s"));
        assert_ne!(base, confirmation_token("router", "switch", "other"));
    }

    #[test]
    fn test_mode_classification() {
        assert!(is_mutating("switch"));
        assert!(is_mutating("boot"));
        assert!(!is_mutating("test"));
    }

    #[test]
    fn test_plan_has_token_and_no_side_effect() {
        let config = test_config(false);
        let plan = tool_deploy_plan(&json!({"host": "router", "mode": "switch"}), &config).unwrap();
        assert_eq!(plan["mutating"], true);
        assert_eq!(plan["mutationAllowed"], false);
        assert!(plan["command"].as_str().unwrap().starts_with("nixos-rebuild switch"));
        assert!(plan["confirmationToken"].as_str().unwrap().starts_with("deploy-"));
    }

    #[test]
    fn test_plan_rejects_bad_mode_and_host() {
        let config = test_config(false);
        assert!(tool_deploy_plan(&json!({"host": "router", "mode": "reboot"}), &config).is_err());
        assert!(tool_deploy_plan(&json!({"host": "toaster", "mode": "switch"}), &config).is_err());
    }

    #[test]
    fn test_execute_refuses_mutation_when_flag_off() {
        let config = test_config(false);
        let plan = tool_deploy_plan(&json!({"host": "router", "mode": "switch"}), &config).unwrap();
        let token = plan["confirmationToken"].as_str().unwrap();

        let result = tool_deploy_execute(
            &json!({"host": "router", "mode": "switch", "confirmation": token}),
            &config,
        )
        .unwrap();
        assert_eq!(result["executed"], false);
        // The refusal surfaces the same token the plan produced
        assert_eq!(result["expectedToken"], plan["confirmationToken"]);
        assert!(result["reason"].as_str().unwrap().contains("allow_mutation"));
    }

    #[test]
    fn test_execute_refuses_wrong_token_even_when_allowed() {
        let config = test_config(true);
        let result = tool_deploy_execute(
            &json!({"host": "router", "mode": "switch", "confirmation": "deploy-bogus"}),
            &config,
        )
        .unwrap();
        assert_eq!(result["executed"], false);
        assert!(result["reason"].as_str().unwrap().contains("mismatch"));
        assert_eq!(
            result["expectedToken"],
            json!(confirmation_token("router", "switch", "test-salt"))
        );
    }

    #[test]
    fn test_execute_requires_confirmation_argument() {
        let config = test_config(true);
        let err = tool_deploy_execute(&json!({"host": "router", "mode": "switch"}), &config).unwrap_err();
        assert!(err.contains("confirmation"));
    }
}
