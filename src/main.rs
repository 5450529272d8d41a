use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info, warn, Instrument};

use storefront_checkout::app_system::{
    setup_tracing, MemoryBackend, Settings, StorefrontSession, StorefrontSystem,
};
use storefront_checkout::checkout::{CheckoutEvent, SubmitOutcome};
use storefront_checkout::domain::{
    AddressForm, AddressSelection, CheckoutPatch, NewLineItem, PaymentData, PaymentMethod, ProductId,
    SubjectId, VariantId,
};

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Args {
    #[arg(long, env = "STOREFRONT_CONFIG", help = "Path to the TOML configuration file.")]
    pub config: Option<String>,

    #[arg(long, default_value = "cod", help = "Payment method for the demo checkout (cod, card, upi, ...).")]
    pub payment_method: String,

    #[arg(long, help = "Have the in-memory payment processor decline every payment.")]
    pub decline_payment: bool,
}

fn demo_patch(method: PaymentMethod) -> CheckoutPatch {
    let mut payment_data = PaymentData::new();
    for field in method.required_fields() {
        payment_data.insert(field.to_string(), format!("demo-{field}"));
    }
    CheckoutPatch {
        shipping: Some(AddressSelection::Manual(AddressForm {
            name: "Asha Rao".into(),
            phone: "9876543210".into(),
            pincode: "560001".into(),
            street: "12 MG Road".into(),
            locality: "Ashok Nagar".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            landmark: Some("Opposite the metro station".into()),
        })),
        payment_method: Some(method),
        payment_data: Some(payment_data),
        ..CheckoutPatch::default()
    }
}

async fn stock_demo_catalogue(backend: &MemoryBackend) -> Result<()> {
    backend.inventory.stock(SubjectId::Variant(VariantId::new("tee-m")), 12).await?;
    backend.inventory.stock(SubjectId::Product(ProductId::new("mug")), 3).await?;
    Ok(())
}

/// Opens a session, walks it through checkout and closes it on every path.
async fn run_checkout(system: &StorefrontSystem, method: PaymentMethod) -> Result<()> {
    let session = system.open_session().await?;
    let outcome = drive_checkout(system, &session, method).await;

    match serde_json::to_string(&session.checkout.view()) {
        Ok(view) => info!(%view, "Final checkout state"),
        Err(e) => warn!(error = %e, "Could not render the checkout state"),
    }
    let closed = session.close().await.map_err(|e| anyhow!(e));
    outcome?;
    closed
}

async fn drive_checkout(system: &StorefrontSystem, session: &StorefrontSession, method: PaymentMethod) -> Result<()> {
    let currency = system.settings().pricing.default_currency.clone();

    session
        .cart
        .add(NewLineItem::new("tee", Decimal::from(300), currency.clone()).with_variant("tee-m"), 2)
        .await?;
    session
        .cart
        .add(
            NewLineItem::new("mug", Decimal::from(250), currency).with_discount_price(Decimal::from(200)),
            1,
        )
        .await?;
    session.cart.apply_coupon("WELCOME10").await?;
    let totals = session.cart.totals().await?;
    info!(subtotal = %totals.subtotal, discount = %totals.discount, total = %totals.total, "Cart ready");

    let mut report = session.availability.watch();
    tokio::time::timeout(OUTCOME_TIMEOUT, report.wait_for(|r| !r.loading && r.unknown.is_empty()))
        .await
        .context("availability check timed out")??;

    let mut events = session.checkout.subscribe();
    session.checkout.begin().await?;
    session.checkout.update_checkout_data(demo_patch(method)).await?;
    session.checkout.advance().await?;
    if !session.checkout.is_checkout_enabled().await? {
        warn!(report = ?session.availability.report(), "Checkout is not enabled");
    }

    match session.checkout.submit().await? {
        SubmitOutcome::Started => info!("Submission started"),
        SubmitOutcome::AlreadyInFlight => bail!("a submission was already in flight"),
    }

    let outcome = tokio::time::timeout(OUTCOME_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(CheckoutEvent::OrderPlaced { order_id, order_number }) => {
                    info!(%order_id, %order_number, "Order placed");
                    return Ok(());
                }
                Ok(CheckoutEvent::SubmissionFailed { error }) => {
                    return Err(anyhow!(error.user_message()));
                }
                Ok(event) => info!(?event, "Checkout event"),
                Err(e) => return Err(anyhow!("checkout event stream ended: {e}")),
            }
        }
    })
    .await
    .context("checkout outcome timed out")?;
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref())?;
    let method = PaymentMethod::parse(&args.payment_method)
        .ok_or_else(|| anyhow!("payment method must not be blank"))?;

    info!(method = %method, "Starting storefront demo");

    let remote = settings.services.inventory_url.is_some();
    let (system, backend) = if remote {
        (StorefrontSystem::with_http(settings)?, None)
    } else {
        let decline = args.decline_payment.then(|| "card declined by issuer".to_string());
        let (system, backend) = StorefrontSystem::in_memory(settings, decline);
        stock_demo_catalogue(&backend).await?;
        (system, Some(backend))
    };

    let badges = system.badges(&[ProductId::new("mug")], &[VariantId::new("tee-m")]);
    badges.refresh_now().await?;

    let span = tracing::info_span!("demo_checkout", method = %method);
    let result = run_checkout(&system, method).instrument(span).await;
    if let Err(e) = &result {
        error!(error = %e, "Checkout did not complete");
    }
    info!(badges = ?badges.view(), "Badge availability");

    drop(badges);
    drop(backend);
    system.shutdown().await.map_err(|e| anyhow!(e))?;

    info!("Storefront demo finished");
    result
}
