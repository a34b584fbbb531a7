//! Domain logic for the podium recommendation client, independent of any
//! transport: the session phase machine, the stream record model, result
//! paging, submission gating, and the auth/session-store seams.

pub mod auth;
pub mod event;
pub mod gate;
pub mod geo;
pub mod pager;
pub mod session;

pub use auth::{AuthInputError, AuthSession, MemorySessionStore, SessionStore};
pub use event::{
    ProtocolViolation, RawServerRecord, Recommendation, ResultSet, ServerEvent, StatusField,
    interpret_record,
};
pub use gate::{SubmissionGate, SubmissionPermit};
pub use geo::{GeoError, GeoPoint, GeoProvider, StaticGeoProvider, UnsupportedGeoProvider};
pub use pager::{PAGE_SIZE, PagerError, ResultPager};
pub use session::{OutOfPhaseEvent, SessionPhase, SessionState};
