//! Booking data model: the wizard accumulator, partial updates, catalog
//! entities, and the normalized booking payload.

use serde::{Deserialize, Serialize};

use super::state::Field;
use crate::error::ValidationError;

/// Entry point into the wizard. Fixes the step order for the wizard's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingPattern {
    /// Map-first: pick a site, then a therapist working there.
    FromMap,
    /// Therapist-first: pick a therapist, then where to meet.
    FromTherapist,
    /// Instant booking from a therapist page.
    Direct,
    /// Concierge chat suggests therapists.
    AiRecommend,
}

impl std::fmt::Display for BookingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FromMap => "FROM_MAP",
            Self::FromTherapist => "FROM_THERAPIST",
            Self::Direct => "DIRECT",
            Self::AiRecommend => "AI_RECOMMEND",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BookingPattern {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FROM_MAP" => Ok(Self::FromMap),
            "FROM_THERAPIST" => Ok(Self::FromTherapist),
            "DIRECT" => Ok(Self::Direct),
            "AI_RECOMMEND" => Ok(Self::AiRecommend),
            _ => Err(format!("Unknown booking pattern: {s}")),
        }
    }
}

/// Where the session takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingType {
    /// At a fixed site.
    Onsite,
    /// The therapist travels to an address the user provides.
    Dispatch,
}

impl std::fmt::Display for BookingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onsite => write!(f, "ONSITE"),
            Self::Dispatch => write!(f, "DISPATCH"),
        }
    }
}

/// A therapist as returned by the therapist endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapistRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialties: Vec<String>,
    /// Sites this therapist takes bookings at.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub site_ids: Vec<String>,
}

impl TherapistRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar_url: None,
            rating: None,
            specialties: Vec::new(),
            site_ids: Vec::new(),
        }
    }
}

/// A site (salon, hotel room, studio) bookings can take place at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl SiteRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            area: None,
            lat: None,
            lng: None,
        }
    }
}

/// The single mandatory service of a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    /// Minutes.
    pub duration: u32,
    /// Yen.
    pub base_price: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An add-on stacked onto the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingOption {
    pub id: String,
    pub name: String,
    /// Minutes.
    pub duration: u32,
    /// Yen.
    pub price: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-therapist menu, as returned by `GET /api/therapists/{id}/menu`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCatalog {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub options: Vec<BookingOption>,
}

/// One therapist suggested by the concierge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub therapist_id: String,
    #[serde(default)]
    pub reason: String,
}

/// The wizard's accumulator.
///
/// Filled in monotonically as the step index increases. Stored in session
/// storage under `booking_in_progress` while the user signs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingData {
    pub pattern: BookingPattern,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub booking_type: Option<BookingType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therapist: Option<TherapistRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteRef>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub options: Vec<BookingOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,
}

impl BookingData {
    /// An empty accumulator for `pattern`.
    pub fn new(pattern: BookingPattern) -> Self {
        Self {
            pattern,
            booking_type: None,
            therapist: None,
            site: None,
            courses: Vec::new(),
            options: Vec::new(),
            scheduled_date: None,
            scheduled_time: None,
            scheduled_at: None,
            total_duration: None,
            total_price: None,
            dispatch_address: None,
            dispatch_lat: None,
            dispatch_lng: None,
            notes: None,
            recommendations: Vec::new(),
        }
    }

    /// Shallow merge: every field present in `patch` overwrites ours.
    pub fn apply(&mut self, patch: BookingPatch) {
        let BookingPatch {
            booking_type,
            therapist,
            site,
            courses,
            options,
            scheduled_date,
            scheduled_time,
            scheduled_at,
            total_duration,
            total_price,
            dispatch_address,
            dispatch_lat,
            dispatch_lng,
            notes,
            recommendations,
        } = patch;

        overwrite(&mut self.booking_type, booking_type);
        overwrite(&mut self.therapist, therapist);
        overwrite(&mut self.site, site);
        if let Some(courses) = courses {
            self.courses = courses;
        }
        if let Some(options) = options {
            self.options = options;
        }
        overwrite(&mut self.scheduled_date, scheduled_date);
        overwrite(&mut self.scheduled_time, scheduled_time);
        overwrite(&mut self.scheduled_at, scheduled_at);
        overwrite(&mut self.total_duration, total_duration);
        overwrite(&mut self.total_price, total_price);
        overwrite(&mut self.dispatch_address, dispatch_address);
        overwrite(&mut self.dispatch_lat, dispatch_lat);
        overwrite(&mut self.dispatch_lng, dispatch_lng);
        overwrite(&mut self.notes, notes);
        if let Some(recommendations) = recommendations {
            self.recommendations = recommendations;
        }
    }

    /// Whether `field` has been filled in.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::BookingType => self.booking_type.is_some(),
            Field::Therapist => self.therapist.is_some(),
            Field::Site => self.site.is_some(),
            Field::Courses => !self.courses.is_empty(),
            // Zero options is a complete answer.
            Field::Options => true,
            Field::Schedule => self.scheduled_at.is_some(),
            Field::Totals => self.total_price.is_some() && self.total_duration.is_some(),
            Field::Dispatch => self.dispatch_address.is_some(),
            Field::Notes => self.notes.is_some(),
            Field::Recommendations => !self.recommendations.is_empty(),
        }
    }

    /// Turn a stored accumulator back into a patch carrying every filled field.
    pub fn into_patch(self) -> BookingPatch {
        BookingPatch {
            booking_type: self.booking_type,
            therapist: self.therapist,
            site: self.site,
            courses: (!self.courses.is_empty()).then_some(self.courses),
            options: (!self.options.is_empty()).then_some(self.options),
            scheduled_date: self.scheduled_date,
            scheduled_time: self.scheduled_time,
            scheduled_at: self.scheduled_at,
            total_duration: self.total_duration,
            total_price: self.total_price,
            dispatch_address: self.dispatch_address,
            dispatch_lat: self.dispatch_lat,
            dispatch_lng: self.dispatch_lng,
            notes: self.notes,
            recommendations: (!self.recommendations.is_empty()).then_some(self.recommendations),
        }
    }

    /// Duration and price of the current menu selection.
    pub fn menu_totals(&self) -> Result<(u32, u32), ValidationError> {
        menu_totals(&self.courses, &self.options)
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// `(total_duration, total_price)` of a course/option selection.
pub fn menu_totals(
    courses: &[Course],
    options: &[BookingOption],
) -> Result<(u32, u32), ValidationError> {
    courses
        .iter()
        .map(|c| (c.duration, c.base_price))
        .chain(options.iter().map(|o| (o.duration, o.price)))
        .try_fold((0u32, 0u32), |(duration, price), (d, p)| {
            Some((duration.checked_add(d)?, price.checked_add(p)?))
        })
        .ok_or(ValidationError::TotalsOverflow)
}

/// A partial update to [`BookingData`]. `pattern` is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub booking_type: Option<BookingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therapist: Option<TherapistRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<Course>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<BookingOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Recommendation>>,
}

impl BookingPatch {
    /// Fields this patch writes, in declaration order, without duplicates.
    pub fn touched_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        let mut touch = |present: bool, field: Field| {
            if present && !fields.contains(&field) {
                fields.push(field);
            }
        };
        touch(self.booking_type.is_some(), Field::BookingType);
        touch(self.therapist.is_some(), Field::Therapist);
        touch(self.site.is_some(), Field::Site);
        touch(self.courses.is_some(), Field::Courses);
        touch(self.options.is_some(), Field::Options);
        touch(
            self.scheduled_date.is_some()
                || self.scheduled_time.is_some()
                || self.scheduled_at.is_some(),
            Field::Schedule,
        );
        touch(
            self.total_duration.is_some() || self.total_price.is_some(),
            Field::Totals,
        );
        touch(
            self.dispatch_address.is_some()
                || self.dispatch_lat.is_some()
                || self.dispatch_lng.is_some(),
            Field::Dispatch,
        );
        touch(self.notes.is_some(), Field::Notes);
        touch(self.recommendations.is_some(), Field::Recommendations);
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }

    /// Field-wise merge of two patches; `other` wins where both are set.
    pub fn merged(mut self, other: BookingPatch) -> BookingPatch {
        macro_rules! take_over {
            ($($f:ident),* $(,)?) => {
                $( if other.$f.is_some() { self.$f = other.$f; } )*
            };
        }
        take_over!(
            booking_type,
            therapist,
            site,
            courses,
            options,
            scheduled_date,
            scheduled_time,
            scheduled_at,
            total_duration,
            total_price,
            dispatch_address,
            dispatch_lat,
            dispatch_lng,
            notes,
            recommendations,
        );
        self
    }

    /// Seed a known therapist (deep link from a therapist page).
    pub fn with_therapist(mut self, therapist: TherapistRef) -> Self {
        self.therapist = Some(therapist);
        self
    }

    /// Seed a known site (deep link from the map).
    pub fn with_site(mut self, site: SiteRef) -> Self {
        self.site = Some(site);
        self
    }

    pub fn with_type(mut self, booking_type: BookingType) -> Self {
        self.booking_type = Some(booking_type);
        self
    }
}

/// Kind of a line item in the booking payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Course,
    Option,
}

/// One line of the flattened course/option list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingItem {
    pub item_type: ItemType,
    pub item_id: String,
    pub item_name: String,
    pub price: u32,
}

/// Body of `POST /api/bookings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub therapist_id: Option<String>,
    pub site_id: Option<String>,
    #[serde(rename = "type")]
    pub booking_type: BookingType,
    pub duration: u32,
    pub price: u32,
    pub scheduled_at: String,
    pub location: Option<String>,
    pub items: Vec<BookingItem>,
    pub notes: Option<String>,
    pub dispatch_address: Option<String>,
    pub dispatch_lat: Option<f64>,
    pub dispatch_lng: Option<f64>,
}

impl CreateBookingRequest {
    /// Normalize the accumulator into the booking payload.
    ///
    /// Courses come first, then options, each tagged with its item type.
    pub fn from_data(data: &BookingData) -> Result<Self, ValidationError> {
        if data.courses.is_empty() {
            return Err(ValidationError::NoCourseSelected);
        }
        let scheduled_at = match (&data.scheduled_date, &data.scheduled_at) {
            (None, _) => return Err(ValidationError::NoDateSelected),
            (Some(_), None) => return Err(ValidationError::NoTimeSelected),
            (Some(_), Some(at)) => at.clone(),
        };
        let booking_type = data.booking_type.ok_or(ValidationError::NoPlacement)?;

        let (computed_duration, computed_price) = data.menu_totals()?;
        let duration = data.total_duration.unwrap_or(computed_duration);
        let price = data.total_price.unwrap_or(computed_price);

        let items = data
            .courses
            .iter()
            .map(|c| BookingItem {
                item_type: ItemType::Course,
                item_id: c.id.clone(),
                item_name: c.name.clone(),
                price: c.base_price,
            })
            .chain(data.options.iter().map(|o| BookingItem {
                item_type: ItemType::Option,
                item_id: o.id.clone(),
                item_name: o.name.clone(),
                price: o.price,
            }))
            .collect();

        let request = match booking_type {
            BookingType::Onsite => {
                let site = data.site.as_ref();
                Self {
                    therapist_id: data.therapist.as_ref().map(|t| t.id.clone()),
                    site_id: site.map(|s| s.id.clone()),
                    booking_type,
                    duration,
                    price,
                    scheduled_at,
                    location: site.map(|s| {
                        if s.address.is_empty() {
                            s.name.clone()
                        } else {
                            s.address.clone()
                        }
                    }),
                    items,
                    notes: data.notes.clone(),
                    dispatch_address: None,
                    dispatch_lat: None,
                    dispatch_lng: None,
                }
            }
            BookingType::Dispatch => {
                let address = data
                    .dispatch_address
                    .clone()
                    .ok_or(ValidationError::DispatchAddressRequired)?;
                Self {
                    therapist_id: data.therapist.as_ref().map(|t| t.id.clone()),
                    site_id: None,
                    booking_type,
                    duration,
                    price,
                    scheduled_at,
                    location: Some(address.clone()),
                    items,
                    notes: data.notes.clone(),
                    dispatch_address: Some(address),
                    dispatch_lat: data.dispatch_lat,
                    dispatch_lng: data.dispatch_lng,
                }
            }
        };
        Ok(request)
    }
}

/// Format a yen amount with thousands separators, e.g. `¥3,000`.
pub fn format_yen(amount: u32) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("¥{out}")
}
