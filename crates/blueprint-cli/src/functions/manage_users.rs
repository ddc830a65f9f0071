//! `manage-users`: admin actions over users and the two managed teams.
//!
//! The body is `{"action": ..., "payload": {...}}`. Supported actions are
//! `listUsers` and `updateTeamMembership`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use blueprint_core::config::env_keys::{ADMIN_TEAM_ID, APPWRITE_API_KEY, BETA_TESTER_TEAM_ID};
use blueprint_core::config::MANAGE_USERS_ENV;
use blueprint_core::error::AppError;
use blueprint_core::store::TeamDirectory;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{header, json_body, success, ApiError, ApiResult};
use crate::state::SharedState;

const DEFAULT_LIMIT: u32 = 25;
const MEMBER_ROLE: &str = "member";

/// The teams this function may read and change.
#[derive(Debug, Clone)]
pub struct ManagedTeams {
    pub admin: String,
    pub beta: String,
}

impl ManagedTeams {
    pub fn contains(&self, team_id: &str) -> bool {
        team_id == self.admin || team_id == self.beta
    }

    fn relevant(&self, team_ids: Vec<String>) -> Vec<String> {
        team_ids.into_iter().filter(|t| self.contains(t)).collect()
    }
}

/// Fails with `Forbidden` unless the invoker is a system call or an admin.
pub async fn authorize(
    teams: &dyn TeamDirectory,
    managed: &ManagedTeams,
    invoker: Option<&str>,
) -> Result<(), AppError> {
    let Some(user_id) = invoker.filter(|u| *u != "unknown") else {
        return Ok(());
    };
    let team_ids = teams.user_team_ids(user_id).await?;
    if team_ids.iter().any(|t| *t == managed.admin) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("User {user_id} is not authorized.")))
    }
}

/// Reads a count from the payload. Accepts numbers and numeric strings.
fn count(payload: &Value, key: &str) -> Option<u32> {
    match payload.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lists users and tags each with the managed teams it belongs to.
pub async fn list_users(
    teams: &dyn TeamDirectory,
    managed: &ManagedTeams,
    payload: &Value,
) -> Result<Value, AppError> {
    let search = payload.get("search").and_then(Value::as_str);
    let limit = count(payload, "limit").filter(|n| *n > 0).unwrap_or(DEFAULT_LIMIT);
    let offset = count(payload, "offset").unwrap_or(0);

    let page = teams.list_users(search, limit, offset).await?;
    let users = join_all(page.users.into_iter().map(|mut user| async move {
        let user_id = user
            .get("$id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let team_ids = match teams.user_team_ids(&user_id).await {
            Ok(ids) => managed.relevant(ids),
            Err(e) => {
                warn!(user = %user_id, error = %e, "Failed to read user teams");
                Vec::new()
            }
        };
        if let Value::Object(map) = &mut user {
            map.insert("teamIds".into(), json!(team_ids));
        }
        user
    }))
    .await;

    info!(returned = users.len(), total = page.total, "Listed users");
    Ok(json!({ "total": page.total, "users": users }))
}

/// Adds or removes a user from one of the managed teams and returns the
/// outcome message.
pub async fn update_membership(
    teams: &dyn TeamDirectory,
    managed: &ManagedTeams,
    payload: &Value,
    redirect_url: &str,
) -> Result<String, AppError> {
    let user_id = payload.get("userId").and_then(Value::as_str).filter(|s| !s.is_empty());
    let team_id = payload.get("teamId").and_then(Value::as_str).filter(|s| !s.is_empty());
    let add = payload.get("add").and_then(Value::as_bool);
    let (Some(user_id), Some(team_id), Some(add)) = (user_id, team_id, add) else {
        return Err(AppError::BadRequest(
            "For updateTeamMembership: userId, teamId, and add (boolean) are required".into(),
        ));
    };
    if !managed.contains(team_id) {
        return Err(AppError::BadRequest(format!(
            "Invalid or disallowed teamId: {team_id}"
        )));
    }

    if add {
        let roles = [MEMBER_ROLE.to_string()];
        return match teams
            .add_membership(team_id, user_id, &roles, redirect_url)
            .await
        {
            Ok(membership_id) => {
                info!(user = user_id, team = team_id, membership = %membership_id, "Added team member");
                Ok(format!("User {user_id} added to team {team_id}."))
            }
            Err(AppError::Conflict(_)) => {
                info!(user = user_id, team = team_id, "User already in team");
                Ok(format!("User {user_id} is already a member of team {team_id}."))
            }
            Err(e) => Err(e),
        };
    }

    match teams.find_membership(team_id, user_id).await? {
        None => Ok(format!("User {user_id} was not in team {team_id}.")),
        Some(membership_id) => {
            teams.delete_membership(team_id, &membership_id).await?;
            info!(user = user_id, team = team_id, membership = %membership_id, "Removed team member");
            Ok(format!("User {user_id} removed from team {team_id}."))
        }
    }
}

/// `POST /manage-users`
pub async fn handle(State(state): State<SharedState>, headers: HeaderMap, body: Bytes) -> ApiResult {
    state.env.require(MANAGE_USERS_ENV)?;
    let managed = ManagedTeams {
        admin: state.env.value(ADMIN_TEAM_ID)?.to_string(),
        beta: state.env.value(BETA_TESTER_TEAM_ID)?.to_string(),
    };
    let teams = state
        .backends
        .teams(&state.env, state.env.value(APPWRITE_API_KEY)?)?;

    let invoker = header(&headers, "x-appwrite-user-id");
    info!(invoker = invoker.unwrap_or("unknown"), "Manage users invoked");
    authorize(teams.as_ref(), &managed, invoker).await?;

    let body = json_body(&body)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid JSON format in request body."))?;
    let Some(action) = body.get("action").and_then(Value::as_str).filter(|a| !a.is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            r#"Missing required field: "action""#,
        ));
    };
    let payload = body.get("payload").cloned().unwrap_or_else(|| json!({}));

    match action {
        "listUsers" => {
            let data = list_users(teams.as_ref(), &managed, &payload).await?;
            Ok(success(json!({ "data": data })))
        }
        "updateTeamMembership" => {
            let message = update_membership(
                teams.as_ref(),
                &managed,
                &payload,
                &state.config.membership_redirect_url,
            )
            .await?;
            Ok(success(json!({ "message": message })))
        }
        other => {
            warn!(action = other, "Unknown action");
            Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("Unknown action: {other}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_teams() {
        let managed = ManagedTeams {
            admin: "admins".into(),
            beta: "beta".into(),
        };
        assert!(managed.contains("admins"));
        assert!(managed.contains("beta"));
        assert!(!managed.contains("others"));
        assert_eq!(
            managed.relevant(vec!["others".into(), "beta".into()]),
            vec!["beta".to_string()]
        );
    }

    #[test]
    fn test_count_accepts_numbers_and_strings() {
        let payload = json!({"limit": 10, "offset": "5", "bad": "x", "neg": -1});
        assert_eq!(count(&payload, "limit"), Some(10));
        assert_eq!(count(&payload, "offset"), Some(5));
        assert_eq!(count(&payload, "bad"), None);
        assert_eq!(count(&payload, "neg"), None);
        assert_eq!(count(&payload, "missing"), None);
    }
}
