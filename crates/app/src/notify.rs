use ecopark_models::{Notifier, Purchase};
use tracing::info;

/// Confirmation notifier that records the confirmation in the log instead
/// of mailing it.
pub struct LogNotifier {
    recipient: String,
}

impl LogNotifier {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self { recipient: recipient.into() }
    }
}

impl Notifier for LogNotifier {
    fn send_confirmation(&mut self, purchase: &Purchase) -> anyhow::Result<()> {
        info!(
            recipient = %self.recipient,
            visit_date = %purchase.visit_date(),
            tickets = purchase.tickets().len(),
            total = purchase.total(),
            payment_method = %purchase.payment_method(),
            purchased_at = %purchase.created_at().format("%d/%m/%Y %H:%M"),
            "Purchase confirmation sent"
        );
        Ok(())
    }
}

/// Used while a card payment is still outstanding; the confirmation goes
/// out once the payment is approved.
pub struct AwaitingPayment;

impl Notifier for AwaitingPayment {
    fn send_confirmation(&mut self, _purchase: &Purchase) -> anyhow::Result<()> {
        Ok(())
    }
}
