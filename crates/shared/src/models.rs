use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Response envelope
// ============================================================================

/// Envelope wrapping every backend response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a non-2xx response. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub user_id: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Payload of login, verify-otp and refresh-token responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, rename = "requires2FA")]
    pub requires_2fa: bool,
    /// Challenge identifier handed back when a second factor is required
    #[serde(default)]
    pub user_id: Option<String>,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    Trainer,
    Admin,
    Employee,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    /// Present for members that have been issued a QR code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberIdentity {
    pub id: String,
    pub qr_code: String,
    pub qr_code_expiry: DateTime<Utc>,
}

impl User {
    /// The member QR identity, if one exists and has not expired at `now`
    pub fn qr_identity_at(&self, now: DateTime<Utc>) -> Option<&MemberIdentity> {
        self.member
            .as_ref()
            .filter(|m| !m.qr_code.is_empty() && m.qr_code_expiry > now)
    }
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub instructor: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub capacity: u32,
    pub current_attendees: u32,
    pub branch_name: String,
}

impl Class {
    /// Attendee count must never exceed capacity
    pub fn is_consistent(&self) -> bool {
        self.current_attendees <= self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.current_attendees >= self.capacity
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub status: ReservationStatus,
    pub member_name: String,
}

/// A class as seen by its trainer, with the roster attached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerClass {
    #[serde(flatten)]
    pub class: Class,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassStatusUpdate {
    pub status: ClassStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceUpdate {
    pub status: ReservationStatus,
}

// ============================================================================
// Branches
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub is_active: bool,
    pub opening_time: String,
    pub closing_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchSummary {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Check-ins
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub qr_code: String,
    pub branch_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: String,
    pub check_in_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub branch: BranchSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckOutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ============================================================================
// Members
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    pub total_checkins_this_month: u32,
    pub total_enrolled_classes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub id: String,
    pub membership_number: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub emergency_phone: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_expiry: Option<DateTime<Utc>>,
}

/// Partial profile update; absent fields are left unchanged server-side
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.emergency_contact.is_none() && self.emergency_phone.is_none()
    }
}

// ============================================================================
// Check-in QR payload
// ============================================================================

/// Structured payload encoded in a branch's check-in QR code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchQrPayload {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Tests
// ============================================================================
