// Member and policy lifecycle
//
// A `PrimaryMember` wraps the latest server snapshot of one member and drives
// the multi-step policy transitions against it: reconcile a plan code,
// replace active policies with a new one (rolling back on failure), and
// terminate active policies until the server reports none left.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

use super::types::{
    ChangeableField, CreatedPolicy, EnsureOutcome, MemberName, MemberRecord, Policy, PolicyChange,
    PolicyPayload, TerminatedPolicy, TerminationOutcome, TerminationPayload, MAX_DEACTIVATION_ATTEMPTS,
    SNAPSHOT_ONLY_KEYS,
};
use crate::api::{ApiError, ApiResult, MemdClient};
use crate::utils::dates;

/// A primary member bound to the client used to manage it
#[derive(Debug)]
pub struct PrimaryMember<'c> {
    client: &'c mut MemdClient,
    record: MemberRecord,
    data: Map<String, Value>,
    dirty: BTreeSet<ChangeableField>,
}

impl<'c> PrimaryMember<'c> {
    /// Wrap a member document returned by the server
    pub fn from_value(client: &'c mut MemdClient, data: Value, url: &str) -> ApiResult<Self> {
        let (record, data) = Self::parse(data, url)?;
        Ok(Self {
            client,
            record,
            data,
            dirty: BTreeSet::new(),
        })
    }

    fn parse(data: Value, url: &str) -> ApiResult<(MemberRecord, Map<String, Value>)> {
        let invalid = |message: String| ApiError::InvalidResponse {
            url: url.to_string(),
            message,
        };

        let map = match data {
            Value::Object(map) => map,
            other => return Err(invalid(format!("expected a member object, got {}", other))),
        };
        if !map.contains_key("externalID") {
            return Err(invalid("externalID is required".to_string()));
        }
        let record = serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| invalid(e.to_string()))?;

        Ok((record, map))
    }

    pub fn external_id(&self) -> &str {
        &self.record.external_id
    }

    pub fn record(&self) -> &MemberRecord {
        &self.record
    }

    /// Raw member document as last loaded, including local edits
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn name(&self) -> Option<&MemberName> {
        self.record.name.as_ref()
    }

    pub fn policies(&self) -> &[Policy] {
        &self.record.policies
    }

    pub fn active_policies(&self) -> Vec<Policy> {
        self.record.active_policies()
    }

    /// Replace local state with the server's current view of the member
    pub fn reload(&mut self) -> ApiResult<()> {
        debug!("Reloading state");
        let url = self.client.member_url(&self.record.external_id);
        let data = self.client.get_json(&url)?;
        let (record, data) = Self::parse(data, &url)?;
        self.record = record;
        self.data = data;
        debug!("State reloaded");
        Ok(())
    }

    /// Terminate one policy as of today
    ///
    /// A 404 from the server means the policy is already gone; it is logged
    /// and reported as `TerminationOutcome::NotFound`.
    pub fn terminate_policy(&mut self, plancode: &str, dry_run: bool) -> ApiResult<TerminationOutcome> {
        info!(
            "Terminating policy for {} plancode {} dry_run={}",
            self.record.external_id, plancode, dry_run
        );
        let payload = TerminationPayload::today();
        if dry_run {
            return Ok(TerminationOutcome::DryRun { payload });
        }

        let url = self.client.termination_url(&self.record.external_id, plancode);
        match self.client.post_json(&url, &payload) {
            Ok(response) => Ok(TerminationOutcome::Terminated {
                response: response.into(),
            }),
            Err(ApiError::NotFound { .. }) => {
                warn!(
                    "For member {}, tried to delete plancode {} but it was not found",
                    self.record.external_id, plancode
                );
                Ok(TerminationOutcome::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    /// Terminate every active policy
    ///
    /// Outside dry-run, one policy is terminated per round and the member is
    /// reloaded before looking for the next, since the server may cascade
    /// changes between calls. Rounds are capped at `MAX_DEACTIVATION_ATTEMPTS`.
    pub fn deactivate_policies(&mut self, dry_run: bool) -> ApiResult<Vec<TerminatedPolicy>> {
        let mut terminated = Vec::new();

        if dry_run {
            for policy in self.active_policies() {
                let outcome = self.terminate_policy(&policy.plancode, true)?;
                terminated.push(TerminatedPolicy { policy, outcome });
            }
            return Ok(terminated);
        }

        // The bound is checked before looking for work, so the 11th round
        // fails even when the 10th left nothing active.
        let mut attempts = 0;
        loop {
            attempts += 1;
            if attempts > MAX_DEACTIVATION_ATTEMPTS {
                return Err(ApiError::TooManyAttempts {
                    external_id: self.record.external_id.clone(),
                    attempts,
                });
            }

            let Some(policy) = self.active_policies().into_iter().next() else {
                break;
            };
            let outcome = self.terminate_policy(&policy.plancode, false)?;
            terminated.push(TerminatedPolicy { policy, outcome });
            self.reload()?;
        }

        debug!(
            "Deactivated {} policies for {} in {} rounds",
            terminated.len(),
            self.record.external_id,
            attempts
        );
        Ok(terminated)
    }

    /// Replace the member's active policies with a new plan code
    ///
    /// Active policies are terminated first. If creating the new policy
    /// fails, each terminated plan code is re-created starting at the new
    /// benefit start (with an open end) on a best-effort basis, and the
    /// original error is returned. A failed reload after a successful create
    /// is logged and the change is still reported.
    pub fn create_policy(
        &mut self,
        plancode: &str,
        benefitstart: Option<NaiveDate>,
        dry_run: bool,
    ) -> ApiResult<PolicyChange> {
        let payload = PolicyPayload {
            benefitstart: dates::midnight_iso(benefitstart.unwrap_or_else(dates::today)),
            benefitend: None,
            plancode: plancode.to_string(),
        };

        if dry_run {
            info!(
                "Creating new policy for {} plancode {} dry_run=true",
                self.record.external_id, plancode
            );
            let terminated = self
                .active_policies()
                .into_iter()
                .map(|policy| TerminatedPolicy {
                    policy,
                    outcome: TerminationOutcome::DryRun {
                        payload: TerminationPayload::today(),
                    },
                })
                .collect();
            return Ok(PolicyChange {
                terminated,
                created: CreatedPolicy::Planned(payload),
            });
        }

        let terminated = self.deactivate_policies(false)?;
        info!(
            "Creating new policy for {} plancode {} dry_run=false",
            self.record.external_id, plancode
        );

        let url = self.client.policy_url(&self.record.external_id);
        match self.client.post_json(&url, &payload) {
            Ok(created) => {
                if let Err(reload_err) = self.reload() {
                    warn!(
                        "Policy {} was created for {} but the member could not be reloaded: {}",
                        plancode, self.record.external_id, reload_err
                    );
                }
                Ok(PolicyChange {
                    terminated,
                    created: CreatedPolicy::Created(created),
                })
            }
            Err(err) => {
                warn!(
                    "Unable to create policy for {}, plancode {}: {}",
                    self.record.external_id, plancode, err
                );
                self.restore_policies(&terminated, &payload.benefitstart);
                if let Err(reload_err) = self.reload() {
                    warn!(
                        "Could not reload {} after failed policy creation: {}",
                        self.record.external_id, reload_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Re-create terminated policies; returns how many were restored
    fn restore_policies(&mut self, terminated: &[TerminatedPolicy], benefitstart: &str) -> usize {
        warn!("Reverting to previous policies");
        let url = self.client.policy_url(&self.record.external_id);
        let mut restored = 0;

        for entry in terminated {
            let payload = PolicyPayload {
                benefitstart: benefitstart.to_string(),
                benefitend: None,
                plancode: entry.policy.plancode.clone(),
            };
            match self.client.post_json(&url, &payload) {
                Ok(_) => restored += 1,
                Err(err) => {
                    warn!(
                        "Error trying to revert policies for {} plancode {}: {}",
                        self.record.external_id, entry.policy.plancode, err
                    );
                }
            }
        }

        restored
    }

    /// Make sure `plancode` is among the active policies, creating it if not
    pub fn ensure_plancode(
        &mut self,
        plancode: &str,
        benefitstart: Option<NaiveDate>,
        dry_run: bool,
    ) -> ApiResult<EnsureOutcome> {
        if self.record.has_active_plancode(plancode) {
            debug!("Plancode {} is active", plancode);
            return Ok(EnsureOutcome::AlreadyActive {
                plancode: plancode.to_string(),
            });
        }

        self.create_policy(plancode, benefitstart, dry_run)
            .map(EnsureOutcome::Changed)
    }

    /// Send a full update: fresh snapshot with the given changeable fields merged in
    ///
    /// Fields outside the changeable set are logged and dropped. Dry-run
    /// returns the merged payload without sending it.
    pub fn update(&mut self, fields: Map<String, Value>, dry_run: bool) -> ApiResult<Value> {
        self.reload()?;

        let mut payload: Map<String, Value> = self
            .data
            .iter()
            .filter(|(key, _)| !SNAPSHOT_ONLY_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in fields {
            if ChangeableField::from_key(&key).is_some() {
                payload.insert(key, value);
            } else {
                warn!("Ignoring update for field {}", key);
            }
        }

        if dry_run {
            return Ok(Value::Object(payload));
        }

        let url = self.client.member_url(&self.record.external_id);
        debug!(
            "Updating {} with payload:\n{}",
            self.record.external_id,
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        );
        let response = self.client.put_json(&url, &payload).map_err(|err| {
            error!("Error updating member {}: {}", self.record.external_id, err);
            err
        })?;
        self.reload()?;

        Ok(response)
    }

    fn mark(&mut self, field: ChangeableField, value: Value) {
        self.data.insert(field.as_key().to_string(), value);
        self.dirty.insert(field);
    }

    pub fn set_name(&mut self, name: MemberName) {
        let value = json!(name);
        self.record.name = Some(name);
        self.mark(ChangeableField::Name, value);
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        let email = email.into();
        self.mark(ChangeableField::Email, json!(email));
        self.record.email = Some(email);
    }

    pub fn set_phone(&mut self, phone: impl Into<String>) {
        let phone = phone.into();
        self.mark(ChangeableField::Phone, json!(phone));
        self.record.phone = Some(phone);
    }

    pub fn set_dob(&mut self, dob: impl Into<String>) {
        let dob = dob.into();
        self.mark(ChangeableField::Dob, json!(dob));
        self.record.dob = Some(dob);
    }

    pub fn set_gender(&mut self, gender: impl Into<String>) {
        let gender = gender.into();
        self.mark(ChangeableField::Gender, json!(gender));
        self.record.gender = Some(gender);
    }

    pub fn set_address(&mut self, address: Value) {
        self.mark(ChangeableField::Address, address.clone());
        self.record.address = Some(address);
    }

    pub fn set_misc3(&mut self, misc3: impl Into<String>) {
        let misc3 = misc3.into();
        self.mark(ChangeableField::Misc3, json!(misc3));
        self.record.misc3 = Some(misc3);
    }

    /// Fields changed locally since the last successful save
    pub fn changed_fields(&self) -> &BTreeSet<ChangeableField> {
        &self.dirty
    }

    /// Partial payload holding only the changed fields
    pub fn changed_payload(&self) -> Map<String, Value> {
        self.dirty
            .iter()
            .map(|field| {
                let value = match field {
                    ChangeableField::Name => json!(self.record.name),
                    ChangeableField::Email => json!(self.record.email),
                    ChangeableField::Phone => json!(self.record.phone),
                    ChangeableField::Dob => json!(self.record.dob),
                    ChangeableField::Gender => json!(self.record.gender),
                    ChangeableField::Address => json!(self.record.address),
                    ChangeableField::Misc3 => json!(self.record.misc3),
                };
                (field.as_key().to_string(), value)
            })
            .collect()
    }

    /// Send only the locally changed fields
    ///
    /// The change set is cleared once the server accepts the update. With
    /// nothing changed no request is made.
    pub fn save(&mut self, dry_run: bool) -> ApiResult<Value> {
        let payload = self.changed_payload();
        if dry_run {
            return Ok(Value::Object(payload));
        }
        if payload.is_empty() {
            debug!("No changes to save for {}", self.record.external_id);
            return Ok(Value::Object(payload));
        }

        let url = self.client.member_url(&self.record.external_id);
        let response = self.client.put_json(&url, &payload)?;
        self.dirty.clear();
        Ok(response)
    }

    /// `save`, logging and discarding any error
    pub fn save_or_log(&mut self, dry_run: bool) -> Option<Value> {
        match self.save(dry_run) {
            Ok(response) => Some(response),
            Err(err) => {
                error!("Error updating member {}: {}", self.record.external_id, err);
                None
            }
        }
    }
}
