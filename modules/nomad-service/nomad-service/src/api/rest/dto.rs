//! Request bodies and the autoscaling payload decoder.
//!
//! Bodies are parsed by hand rather than through the `Json` extractor so
//! that every malformed body surfaces as the same not-found response as a
//! bad key.

use nomad_service_sdk::{InstanceHealth, LifecycleEvent, LifecycleTransition};
use serde::Deserialize;

use crate::domain::autoscaling::AutoscalingRequest;

/// Header SNS sets on every HTTP delivery.
pub const SNS_TOPIC_HEADER: &str = "x-amz-sns-topic-arn";

#[derive(Deserialize)]
pub struct DeployRequestDto {
    pub version: String,
}

impl DeployRequestDto {
    #[must_use]
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|dto| !dto.version.is_empty())
    }
}

#[derive(Deserialize)]
pub struct ReloadRequestDto {
    pub secret: String,
}

impl ReloadRequestDto {
    #[must_use]
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

#[derive(Deserialize)]
struct DirectAutoscalingDto {
    #[serde(default)]
    instance: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, rename = "lifecycle-hook-name")]
    lifecycle_hook_name: Option<String>,
}

#[derive(Deserialize)]
struct SnsEnvelopeDto {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "SubscribeURL", default)]
    subscribe_url: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct LifecycleMessageDto {
    #[serde(rename = "LifecycleTransition", default)]
    transition: Option<String>,
    #[serde(rename = "EC2InstanceId", default)]
    instance_id: Option<String>,
    #[serde(rename = "LifecycleHookName", default)]
    hook_name: Option<String>,
    #[serde(rename = "AutoScalingGroupName", default)]
    auto_scaling_group: Option<String>,
}

/// Why an autoscaling payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid autoscaling payload: {0}")]
pub struct InvalidPayload(pub &'static str);

fn required(value: Option<String>, what: &'static str) -> Result<String, InvalidPayload> {
    value.filter(|v| !v.is_empty()).ok_or(InvalidPayload(what))
}

/// Decode an autoscaling call. `push` is true when the SNS topic header is present.
///
/// # Errors
/// Returns `InvalidPayload` when the body is not JSON or lacks a field the
/// selected variant needs.
pub fn decode_autoscaling(push: bool, body: &[u8]) -> Result<AutoscalingRequest, InvalidPayload> {
    if push {
        decode_push(body)
    } else {
        decode_direct(body)
    }
}

fn decode_push(body: &[u8]) -> Result<AutoscalingRequest, InvalidPayload> {
    let envelope: SnsEnvelopeDto =
        serde_json::from_slice(body).map_err(|_| InvalidPayload("body is not an SNS envelope"))?;

    match envelope.kind.as_str() {
        "SubscriptionConfirmation" => Ok(AutoscalingRequest::PushConfirmation {
            subscribe_url: required(envelope.subscribe_url, "SubscribeURL")?,
        }),
        "Notification" => {
            let raw = required(envelope.message, "Message")?;
            let Ok(message) = serde_json::from_str::<LifecycleMessageDto>(&raw) else {
                return Ok(AutoscalingRequest::PushIgnored {
                    reason: "message is not a lifecycle message".to_owned(),
                });
            };
            let Some(transition) = message.transition else {
                return Ok(AutoscalingRequest::PushIgnored {
                    reason: "message has no lifecycle transition".to_owned(),
                });
            };
            let transition = LifecycleTransition::parse(&transition);
            if transition != LifecycleTransition::Terminating {
                return Ok(AutoscalingRequest::PushIgnored {
                    reason: "transition is not a termination".to_owned(),
                });
            }
            Ok(AutoscalingRequest::PushNotification(LifecycleEvent {
                instance_id: required(message.instance_id, "EC2InstanceId")?,
                transition,
                hook_name: required(message.hook_name, "LifecycleHookName")?,
                auto_scaling_group: required(message.auto_scaling_group, "AutoScalingGroupName")?,
            }))
        }
        other => Ok(AutoscalingRequest::PushIgnored {
            reason: format!("message type {other}"),
        }),
    }
}

fn decode_direct(body: &[u8]) -> Result<AutoscalingRequest, InvalidPayload> {
    let dto: DirectAutoscalingDto =
        serde_json::from_slice(body).map_err(|_| InvalidPayload("body is not a JSON object"))?;
    let instance = required(dto.instance, "instance")?;

    match required(dto.state, "state")?.as_str() {
        "Healthy" => Ok(AutoscalingRequest::DirectHealth {
            instance,
            health: InstanceHealth::Healthy,
        }),
        "Unhealthy" => Ok(AutoscalingRequest::DirectHealth {
            instance,
            health: InstanceHealth::Unhealthy,
        }),
        "Continue" => Ok(AutoscalingRequest::DirectContinue {
            instance,
            hook_name: required(dto.lifecycle_hook_name, "lifecycle-hook-name")?,
        }),
        _ => Err(InvalidPayload("unknown state")),
    }
}
