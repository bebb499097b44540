//! Handler registration and typed parameter extraction

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::app::options::RuntimeMcpOptions;
use crate::error::{Error, ErrorCode};
use crate::types::{
    CallToolRequestParams, GetPromptRequestParams, IntoResponse, ReadResourceRequestParams,
    Request, RequestId,
};
use crate::Context;

/// A registered, type-erased handler.
pub(crate) type RequestHandler<T> = Arc<
    dyn Handler<T>
    + Send
    + Sync
>;

/// A registered notification handler.
pub(crate) type NotificationHandler = Arc<
    dyn Fn(Context, crate::types::Notification) -> BoxFuture<'static, ()>
    + Send
    + Sync
>;

/// The dispatch payload handed to a [`Handler`].
#[derive(Debug)]
pub enum HandlerParams {
    /// A raw inbound request with its context.
    Request(Context, Request),

    /// A direct tool invocation.
    Tool(CallToolRequestParams),

    /// A direct resource read.
    Resource(Context, ReadResourceRequestParams),

    /// A direct prompt render.
    Prompt(Context, GetPromptRequestParams),
}

impl From<CallToolRequestParams> for HandlerParams {
    #[inline]
    fn from(params: CallToolRequestParams) -> Self {
        Self::Tool(params)
    }
}

/// A request-to-response handler.
pub(crate) trait Handler<T> {
    fn call(&self, params: HandlerParams) -> BoxFuture<'_, Result<T, Error>>;
}

/// An extractor that rebuilds typed arguments from [`HandlerParams`].
pub trait FromHandlerParams: Sized {
    fn from_params(params: &HandlerParams) -> Result<Self, Error>;
}

/// A function of typed, extractable arguments.
pub trait GenericHandler<Args>: Clone + Send + Sync + 'static {
    /// Output type
    type Output;
    /// Output future
    type Future: Future<Output = Self::Output> + Send;

    fn call(&self, args: Args) -> Self::Future;
}

/// Adapts a [`GenericHandler`] into a dispatchable [`Handler`].
pub(crate) struct RequestFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: IntoResponse,
    Args: FromHandlerParams,
{
    func: F,
    _marker: std::marker::PhantomData<Args>,
}

impl<F, R, Args> RequestFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: IntoResponse,
    Args: FromHandlerParams,
{
    pub(crate) fn new(func: F) -> Arc<Self> {
        Arc::new(Self { func, _marker: std::marker::PhantomData })
    }
}

impl<F, R, Args> Handler<crate::types::Message> for RequestFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: IntoResponse,
    Args: FromHandlerParams + Send + Sync,
{
    #[inline]
    fn call(&self, params: HandlerParams) -> BoxFuture<'_, Result<crate::types::Message, Error>> {
        Box::pin(async move {
            let id = RequestId::from_params(&params)?;
            let args = Args::from_params(&params)?;
            Ok(self.func
                .call(args)
                .await
                .into_response(id))
        })
    }
}

/// Adapts a [`GenericHandler`] whose output converts into a result payload.
pub(crate) struct TypedFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    Args: FromHandlerParams,
{
    func: F,
    _marker: std::marker::PhantomData<Args>,
}

impl<F, R, Args> TypedFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    Args: FromHandlerParams,
{
    pub(crate) fn new(func: F) -> Arc<Self> {
        Arc::new(Self { func, _marker: std::marker::PhantomData })
    }
}

impl<F, R, Args, T> Handler<T> for TypedFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: TryInto<T>,
    R::Error: Into<Error>,
    Args: FromHandlerParams + Send + Sync,
{
    #[inline]
    fn call(&self, params: HandlerParams) -> BoxFuture<'_, Result<T, Error>> {
        Box::pin(async move {
            let args = Args::from_params(&params)?;
            self.func
                .call(args)
                .await
                .try_into()
                .map_err(Into::into)
        })
    }
}

impl FromHandlerParams for () {
    fn from_params(_: &HandlerParams) -> Result<Self, Error> {
        Ok(())
    }
}

impl FromHandlerParams for RequestId {
    fn from_params(params: &HandlerParams) -> Result<Self, Error> {
        match params {
            HandlerParams::Request(_, req) => Ok(req.id.clone()),
            _ => Err(Error::new(ErrorCode::InternalError, "invalid handler parameters")),
        }
    }
}

impl FromHandlerParams for Context {
    #[inline]
    fn from_params(params: &HandlerParams) -> Result<Self, Error> {
        match params {
            HandlerParams::Request(context, _)
            | HandlerParams::Resource(context, _)
            | HandlerParams::Prompt(context, _) => Ok(context.clone()),
            _ => Err(Error::new(ErrorCode::InternalError, "invalid handler parameters")),
        }
    }
}

impl FromHandlerParams for RuntimeMcpOptions {
    #[inline]
    fn from_params(params: &HandlerParams) -> Result<Self, Error> {
        Context::from_params(params).map(|ctx| ctx.options())
    }
}

impl FromHandlerParams for Request {
    #[inline]
    fn from_params(params: &HandlerParams) -> Result<Self, Error> {
        match params {
            HandlerParams::Request(_, req) => Ok(req.clone()),
            _ => Err(Error::new(ErrorCode::InternalError, "invalid handler parameters")),
        }
    }
}

impl FromHandlerParams for ReadResourceRequestParams {
    #[inline]
    fn from_params(params: &HandlerParams) -> Result<Self, Error> {
        match params {
            HandlerParams::Resource(_, params) => Ok(params.clone()),
            HandlerParams::Request(_, req) => req.params(),
            _ => Err(Error::new(ErrorCode::InternalError, "invalid handler parameters")),
        }
    }
}

impl FromHandlerParams for GetPromptRequestParams {
    #[inline]
    fn from_params(params: &HandlerParams) -> Result<Self, Error> {
        match params {
            HandlerParams::Prompt(_, params) => Ok(params.clone()),
            HandlerParams::Request(_, req) => req.params(),
            _ => Err(Error::new(ErrorCode::InternalError, "invalid handler parameters")),
        }
    }
}

/// Implements [`FromHandlerParams`] for payloads rebuilt from request params
/// through their [`crate::types::FromRequest`] factory.
macro_rules! impl_from_request_params {
    ($($t:ty),* $(,)?) => {
        $(impl FromHandlerParams for $t {
            #[inline]
            fn from_params(params: &HandlerParams) -> Result<Self, Error> {
                let req = Request::from_params(params)?;
                crate::types::FromRequest::from_request(&req)
            }
        })*
    };
}

impl_from_request_params! {
    crate::types::InitializeRequestParams,
    crate::types::CompleteRequestParams,
    crate::types::ListToolsRequestParams,
    crate::types::CallToolRequestParams,
    crate::types::ListResourcesRequestParams,
    crate::types::SubscribeRequestParams,
    crate::types::ListPromptsRequestParams,
    crate::types::SetLevelRequestParams,
    crate::types::CancelledNotificationParams,
    crate::types::ListTasksRequestParams,
    crate::types::GetTaskRequestParams,
    crate::types::GetTaskResultRequestParams,
    crate::types::CancelTaskRequestParams,
}

macro_rules! impl_from_handler_params {
    ($($T: ident),*) => {
        impl<$($T: FromHandlerParams),+> FromHandlerParams for ($($T,)+) {
            #[inline]
            fn from_params(params: &HandlerParams) -> Result<Self, Error> {
                let args = ($(
                    $T::from_params(params)?,
                )*);
                Ok(args)
            }
        }
    };
}

impl_from_handler_params! { T1 }
impl_from_handler_params! { T1, T2 }
impl_from_handler_params! { T1, T2, T3 }

macro_rules! impl_generic_handler ({ $($param:ident)* } => {
    impl<Func, Fut: Send, $($param,)*> GenericHandler<($($param,)*)> for Func
    where
        Func: Fn($($param),*) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future + 'static,
    {
        type Output = Fut::Output;
        type Future = Fut;

        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Self::Future {
            (self)($($param,)*)
        }
    }
});

impl_generic_handler! {}
impl_generic_handler! { T1 }
impl_generic_handler! { T1 T2 }
impl_generic_handler! { T1 T2 T3 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_extracts_unit_from_any_params() {
        let params = HandlerParams::Tool(CallToolRequestParams::new("t"));
        assert!(<() as FromHandlerParams>::from_params(&params).is_ok());
    }

    #[test]
    fn it_refuses_request_extraction_from_tool_params() {
        let params = HandlerParams::Tool(CallToolRequestParams::new("t"));
        assert!(Request::from_params(&params).is_err());
    }
}
