//! In-memory [`BookingApi`] for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{BookingApi, CreatedBooking, SiteQuery, TherapistQuery};
use crate::booking::model::{
    BookingOption, Course, CreateBookingRequest, MenuCatalog, SiteRef, TherapistRef,
};
use crate::error::ApiError;

#[derive(Default)]
pub(crate) struct FakeBookingApi {
    pub sites: Vec<SiteRef>,
    pub therapists: Vec<TherapistRef>,
    pub menu: MenuCatalog,
    pub fail_lists: Mutex<u32>,
    pub fail_create: bool,
    pub fail_notify: bool,
    /// Never answer the confirmation notice.
    pub stall_notify: bool,
    pub created: Mutex<Vec<(String, CreateBookingRequest)>>,
    pub notified: Mutex<Vec<String>>,
    pub therapist_queries: Mutex<Vec<TherapistQuery>>,
}

impl FakeBookingApi {
    pub fn with_catalog() -> Self {
        let mut aoi = TherapistRef::new("t1", "Aoi");
        aoi.site_ids = vec!["s1".into()];
        let ren = TherapistRef::new("t2", "Ren");
        Self {
            sites: vec![
                SiteRef::new("s1", "Shibuya Studio", "1-1 Shibuya"),
                SiteRef::new("s2", "Ebisu Room", "2-2 Ebisu"),
            ],
            therapists: vec![aoi, ren],
            menu: MenuCatalog {
                courses: vec![
                    Course {
                        id: "mc_1".into(),
                        name: "深層筋ボディケア".into(),
                        duration: 30,
                        base_price: 3000,
                        description: None,
                    },
                    Course {
                        id: "mc_2".into(),
                        name: "Aroma 60".into(),
                        duration: 60,
                        base_price: 6500,
                        description: None,
                    },
                ],
                options: vec![
                    BookingOption {
                        id: "op_1".into(),
                        name: "Head spa".into(),
                        duration: 15,
                        price: 1500,
                        description: None,
                    },
                    BookingOption {
                        id: "op_2".into(),
                        name: "Hot stone".into(),
                        duration: 10,
                        price: 1000,
                        description: None,
                    },
                ],
            },
            ..Default::default()
        }
    }

    /// Make the next `n` list/detail calls fail.
    pub fn fail_next_lists(&self, n: u32) {
        *self.fail_lists.lock().unwrap() = n;
    }

    fn maybe_fail(&self, endpoint: &str) -> Result<(), ApiError> {
        let mut remaining = self.fail_lists.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }

    pub fn created(&self) -> Vec<(String, CreateBookingRequest)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingApi for FakeBookingApi {
    async fn list_sites(&self, _query: &SiteQuery) -> Result<Vec<SiteRef>, ApiError> {
        self.maybe_fail("/api/sites")?;
        Ok(self.sites.clone())
    }

    async fn get_site(&self, id: &str) -> Result<SiteRef, ApiError> {
        self.maybe_fail("/api/sites/{id}")?;
        self.sites
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                entity: "Site".into(),
                id: id.into(),
            })
    }

    async fn list_therapists(&self, query: &TherapistQuery) -> Result<Vec<TherapistRef>, ApiError> {
        self.maybe_fail("/api/therapists")?;
        self.therapist_queries.lock().unwrap().push(query.clone());
        Ok(self
            .therapists
            .iter()
            .filter(|t| match &query.site_id {
                Some(site) => t.site_ids.contains(site),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_therapist(&self, id: &str) -> Result<TherapistRef, ApiError> {
        self.maybe_fail("/api/therapists/{id}")?;
        self.therapists
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                entity: "Therapist".into(),
                id: id.into(),
            })
    }

    async fn get_menu(&self, _therapist_id: &str) -> Result<MenuCatalog, ApiError> {
        self.maybe_fail("/api/therapists/{id}/menu")?;
        Ok(self.menu.clone())
    }

    async fn create_booking(
        &self,
        token: &SecretString,
        request: &CreateBookingRequest,
    ) -> Result<CreatedBooking, ApiError> {
        if self.fail_create {
            return Err(ApiError::Status {
                endpoint: "/api/bookings".into(),
                status: 500,
                body: "boom".into(),
            });
        }
        let mut created = self.created.lock().unwrap();
        created.push((token.expose_secret().to_string(), request.clone()));
        Ok(CreatedBooking {
            id: format!("bk_{}", created.len()),
            status: Some("pending".into()),
        })
    }

    async fn notify_booking_confirmed(
        &self,
        _token: &SecretString,
        booking_id: &str,
    ) -> Result<(), ApiError> {
        self.notified.lock().unwrap().push(booking_id.to_string());
        if self.stall_notify {
            std::future::pending::<()>().await;
        }
        if self.fail_notify {
            return Err(ApiError::RequestFailed {
                endpoint: "/api/bookings/notify".into(),
                reason: "mailer down".into(),
            });
        }
        Ok(())
    }
}
