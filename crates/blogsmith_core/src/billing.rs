//! crates/blogsmith_core/src/billing.rs
//!
//! The plan catalogue and the payment flow that upgrades an account.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Account, Plan, PlanChange, SubscriptionStatus, UserId, FREE_GENERATIONS_LIMIT};
use crate::error::{ServiceError, ServiceResult};
use crate::feed::AccountFeed;
use crate::ports::{AccountStore, CaptureStatus, PaymentGateway, PortError, Price};

/// Generation allowance of every paid plan.
pub const PAID_GENERATIONS_LIMIT: u32 = 9999;

/// Price and allowance of one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTerms {
    pub plan: Plan,
    /// `None` for plans that cannot be bought.
    pub price: Option<Price>,
    pub generations_limit: u32,
}

static CATALOG: [PlanTerms; 3] = [
    PlanTerms {
        plan: Plan::Free,
        price: None,
        generations_limit: FREE_GENERATIONS_LIMIT,
    },
    PlanTerms {
        plan: Plan::Monthly,
        price: Some(Price {
            amount: "9.00",
            currency: "USD",
        }),
        generations_limit: PAID_GENERATIONS_LIMIT,
    },
    PlanTerms {
        plan: Plan::Annual,
        price: Some(Price {
            amount: "49.00",
            currency: "USD",
        }),
        generations_limit: PAID_GENERATIONS_LIMIT,
    },
];

/// The single source of plan prices, read by both the pricing listing and
/// order creation.
pub struct PlanCatalog;

impl PlanCatalog {
    pub fn all() -> &'static [PlanTerms] {
        &CATALOG
    }

    pub fn terms(plan: Plan) -> &'static PlanTerms {
        match plan {
            Plan::Free => &CATALOG[0],
            Plan::Monthly => &CATALOG[1],
            Plan::Annual => &CATALOG[2],
        }
    }

    fn price(plan: Plan) -> ServiceResult<Price> {
        Self::terms(plan).price.ok_or_else(|| {
            ServiceError::InvalidInput(format!("The {} plan cannot be purchased.", plan))
        })
    }
}

/// Creates and captures payment orders and applies the resulting plan.
///
/// Plan changes are written directly to the account record; they do not go
/// through the generation transaction. The two paths touch disjoint fields.
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn AccountStore>,
    gateway: Arc<dyn PaymentGateway>,
    feed: Arc<AccountFeed>,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        gateway: Arc<dyn PaymentGateway>,
        feed: Arc<AccountFeed>,
    ) -> Self {
        Self {
            store,
            gateway,
            feed,
        }
    }

    pub async fn create_order(&self, plan: Plan) -> ServiceResult<String> {
        let price = PlanCatalog::price(plan)?;
        let order_id = self.gateway.create_order(price).await.map_err(|e| {
            warn!("Failed to create order for {} plan: {}", plan, e);
            ServiceError::Payment(provider_detail(e))
        })?;
        info!("Created order {} for {} plan ({} {})", order_id, plan, price.amount, price.currency);
        Ok(order_id)
    }

    /// Captures `order_id` and, once the provider reports it completed for
    /// exactly the price of `plan`, moves the account onto `plan`.
    ///
    /// `generations_used` and `lifetime_generations` are left as they are.
    pub async fn capture_and_upgrade(
        &self,
        user_id: &UserId,
        plan: Plan,
        order_id: &str,
    ) -> ServiceResult<Account> {
        let terms = PlanCatalog::terms(plan);
        let price = PlanCatalog::price(plan)?;

        let outcome = self.gateway.capture_order(order_id).await.map_err(|e| {
            warn!("Failed to capture order {}: {}", order_id, e);
            ServiceError::Payment(provider_detail(e))
        })?;

        if let CaptureStatus::Other(status) = &outcome.status {
            warn!("Order {} finished with status {}", order_id, status);
            return Err(ServiceError::Payment(outcome.detail.unwrap_or_else(|| {
                "Your payment was not completed. Please try again.".to_string()
            })));
        }
        // The requested plan is only trusted once the captured amount pays for it.
        match outcome.amount.as_deref() {
            Some(amount) if amount == price.amount => {}
            Some(amount) => {
                warn!(
                    "Order {} captured {} but the {} plan costs {}",
                    order_id, amount, plan, price.amount
                );
                return Err(ServiceError::Payment(format!(
                    "The captured amount does not match the {} plan.",
                    plan
                )));
            }
            None => {
                warn!("Order {} completed without a captured amount", order_id);
                return Err(ServiceError::Payment(
                    "The payment provider did not confirm the captured amount.".to_string(),
                ));
            }
        }

        let change = PlanChange {
            plan,
            status: SubscriptionStatus::Active,
            generations_limit: terms.generations_limit,
        };
        let account = self
            .store
            .apply_plan_change(user_id, change)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => ServiceError::AccountMissing(user_id.clone()),
                other => ServiceError::Persistence(other.to_string()),
            })?;

        info!("User {} upgraded to the {} plan", user_id, plan);
        self.feed.publish(user_id.as_str(), account.clone());
        Ok(account)
    }
}

fn provider_detail(error: PortError) -> String {
    match error {
        PortError::Unexpected(detail) | PortError::Conflict(detail) | PortError::NotFound(detail) => {
            detail
        }
        PortError::Unauthorized => "The payment provider rejected our credentials.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identity;
    use crate::memory::MemoryStore;
    use crate::ports::{CaptureOutcome, PortResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubGateway {
        outcome: CaptureOutcome,
        created: Mutex<Vec<Price>>,
    }

    impl StubGateway {
        fn completing(amount: Option<&str>) -> Self {
            Self::with(CaptureOutcome {
                status: CaptureStatus::Completed,
                detail: None,
                amount: amount.map(str::to_string),
            })
        }

        fn with(outcome: CaptureOutcome) -> Self {
            Self {
                outcome,
                created: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_order(&self, price: Price) -> PortResult<String> {
            self.created.lock().unwrap().push(price);
            Ok("ORDER-1".to_string())
        }

        async fn capture_order(&self, _order_id: &str) -> PortResult<CaptureOutcome> {
            Ok(self.outcome.clone())
        }
    }

    async fn setup(gateway: StubGateway) -> (Arc<MemoryStore>, Arc<StubGateway>, BillingService, UserId) {
        let store = Arc::new(MemoryStore::new());
        let mut account = Account::new_free(&Identity {
            uid: UserId::new("payer"),
            email: None,
            display_name: None,
            photo_url: None,
        });
        account.subscription.generations_used = 2;
        account.subscription.lifetime_generations = 5;
        store.put_account(account).await;

        let gateway = Arc::new(gateway);
        let service = BillingService::new(store.clone(), gateway.clone(), Arc::new(AccountFeed::new()));
        (store, gateway, service, UserId::new("payer"))
    }

    #[test]
    fn catalog_lists_every_plan_once() {
        let plans: Vec<_> = PlanCatalog::all().iter().map(|t| t.plan).collect();
        assert_eq!(plans, Plan::ALL.to_vec());
        assert_eq!(PlanCatalog::terms(Plan::Monthly).price.unwrap().amount, "9.00");
        assert_eq!(PlanCatalog::terms(Plan::Annual).price.unwrap().amount, "49.00");
        assert_eq!(PlanCatalog::terms(Plan::Free).generations_limit, 3);
    }

    #[tokio::test]
    async fn orders_use_catalog_prices() {
        let (_, gateway, service, _) = setup(StubGateway::completing(None)).await;
        let order = service.create_order(Plan::Annual).await.unwrap();
        assert_eq!(order, "ORDER-1");
        assert_eq!(gateway.created.lock().unwrap()[0].amount, "49.00");
    }

    #[tokio::test]
    async fn free_plan_cannot_be_ordered() {
        let (_, gateway, service, _) = setup(StubGateway::completing(None)).await;
        let err = service.create_order(Plan::Free).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(gateway.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_capture_upgrades_plan_only() {
        let (store, _, service, uid) = setup(StubGateway::completing(Some("9.00"))).await;

        let account = service.capture_and_upgrade(&uid, Plan::Monthly, "ORDER-1").await.unwrap();

        assert_eq!(account.subscription.plan, Plan::Monthly);
        assert_eq!(account.subscription.status, SubscriptionStatus::Active);
        assert_eq!(account.subscription.generations_limit, 9999);
        assert_eq!(account.subscription.generations_used, 2);
        assert_eq!(account.subscription.lifetime_generations, 5);
        assert_eq!(store.get_account(&uid).await.unwrap(), account);
    }

    #[tokio::test]
    async fn incomplete_capture_reports_provider_detail() {
        let (store, _, service, uid) = setup(StubGateway::with(CaptureOutcome {
            status: CaptureStatus::Other("PAYER_ACTION_REQUIRED".to_string()),
            detail: Some("Card declined".to_string()),
            amount: None,
        }))
        .await;

        let err = service.capture_and_upgrade(&uid, Plan::Monthly, "ORDER-1").await.unwrap_err();

        assert!(matches!(err, ServiceError::Payment(ref d) if d == "Card declined"));
        assert_eq!(store.get_account(&uid).await.unwrap().subscription.plan, Plan::Free);
    }

    #[tokio::test]
    async fn mismatched_amount_is_refused() {
        let (store, _, service, uid) = setup(StubGateway::completing(Some("9.00"))).await;

        let err = service.capture_and_upgrade(&uid, Plan::Annual, "ORDER-1").await.unwrap_err();

        assert!(matches!(err, ServiceError::Payment(_)));
        assert_eq!(store.get_account(&uid).await.unwrap().subscription.plan, Plan::Free);
    }

    #[tokio::test]
    async fn completion_without_amount_is_refused() {
        let (store, gateway, service, uid) = setup(StubGateway::completing(None)).await;
        service.create_order(Plan::Monthly).await.unwrap();
        assert_eq!(gateway.created.lock().unwrap()[0].amount, "9.00");

        let err = service.capture_and_upgrade(&uid, Plan::Annual, "ORDER-1").await.unwrap_err();

        assert!(matches!(err, ServiceError::Payment(_)));
        let account = store.get_account(&uid).await.unwrap();
        assert_eq!(account.subscription.plan, Plan::Free);
        assert_eq!(account.subscription.generations_limit, 3);
    }

    #[tokio::test]
    async fn upgrade_is_published_to_subscribers() {
        let store = Arc::new(MemoryStore::new());
        let account = store
            .create_account_if_absent(&Identity {
                uid: UserId::new("payer"),
                email: None,
                display_name: None,
                photo_url: None,
            })
            .await
            .unwrap();
        let feed = Arc::new(AccountFeed::new());
        let service = BillingService::new(
            store,
            Arc::new(StubGateway::completing(Some("49.00"))),
            feed.clone(),
        );
        let mut sub = feed.subscribe(account.user_id.as_str());

        service.capture_and_upgrade(&account.user_id, Plan::Annual, "O").await.unwrap();

        let update = sub.next().await.unwrap();
        assert_eq!(update.subscription.plan, Plan::Annual);
    }
}
