use thiserror::Error;

/// Business-rule failures of a ticket purchase.
///
/// The messages are shown to the visitor as-is, so they stay in Spanish.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    #[error("La fecha de la compra no puede ser en el pasado")]
    PastDate,

    #[error("No se pueden comprar mas de 10 entradas")]
    TooManyTickets,

    #[error("No se han agregado entradas a la compra")]
    NoTickets,

    #[error("El parque está cerrado en esta fecha")]
    ParkClosed,

    #[error("El medio de pago especificado no es válido o falta.")]
    InvalidPaymentMethod,

    #[error("El usuario con id {0} no está registrado en el sistema")]
    UserNotRegistered(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tipo de entrada desconocido: {0}")]
pub struct UnknownTier(pub String);
