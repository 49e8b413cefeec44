use anyhow::anyhow;

/// Whether an in-memory driven port should behave as if its backing service is reachable.
/// Tests flip a port to [Connectivity::Disconnected] to exercise error propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Connected,
    Disconnected,
}

impl Connectivity {
    /// Fails with a generic port error while disconnected
    pub fn blow_up_if_disconnected(&self) -> Result<(), anyhow::Error> {
        match self {
            Self::Connected => Ok(()),
            Self::Disconnected => Err(anyhow!("could not connect to service!")),
        }
    }
}

/// Records the arguments a mocked function was called with and hands back a canned result.
/// Mocks wrap themselves in a [std::sync::Mutex] so the recording can happen through `&self`.
///
/// ```ignore
/// pub struct MockSuggestionService {
///     pub suggest_result: FakeImplementation<SuggestionRequest, Result<PrioritySuggestion, SuggestionError>>,
/// }
///
/// impl SuggestionPort for Mutex<MockSuggestionService> {
///     async fn suggest_priority(&self, request: &SuggestionRequest, ...) -> Result<PrioritySuggestion, SuggestionError> {
///         let mut locked_self = self.lock().unwrap();
///         locked_self.suggest_result.save_arguments(request.clone());
///         locked_self.suggest_result.return_value_result()
///     }
/// }
/// ```
pub struct FakeImplementation<Args, Ret> {
    saved_arguments: Vec<Args>,
    return_value: Option<Ret>,
}

impl<Args, Ret> FakeImplementation<Args, Ret> {
    pub fn new() -> FakeImplementation<Args, Ret> {
        FakeImplementation {
            saved_arguments: Vec::new(),
            return_value: None,
        }
    }

    pub fn save_arguments(&mut self, arguments: Args) {
        self.saved_arguments.push(arguments)
    }

    /// Arguments from every call, oldest first
    pub fn calls(&self) -> &[Args] {
        self.saved_arguments.as_slice()
    }

    pub fn was_called(&self) -> bool {
        !self.saved_arguments.is_empty()
    }
}

#[allow(dead_code)]
impl<Args, Ret> FakeImplementation<Args, Ret>
where
    Ret: Clone,
{
    pub fn set_return_value(&mut self, return_value: Ret) {
        self.return_value = Some(return_value)
    }

    pub fn return_value(&self) -> Ret {
        match self.return_value {
            None => panic!("Tried to return from a mock whose return value wasn't set!"),
            Some(ref ret_val) => ret_val.clone(),
        }
    }
}

impl<Args, Success, Fail> FakeImplementation<Args, Result<Success, Fail>>
where
    Success: Clone,
    Fail: Clone,
{
    pub fn set_returned_result(&mut self, return_value: Result<Success, Fail>) {
        self.return_value = Some(return_value);
    }

    pub fn return_value_result(&self) -> Result<Success, Fail> {
        match self.return_value {
            Some(Ok(ref ok_result)) => Ok(ok_result.clone()),
            Some(Err(ref err)) => Err(err.clone()),
            None => panic!("Tried to return from a mock whose return value wasn't set!"),
        }
    }
}

#[allow(dead_code)]
impl<Args, Success> FakeImplementation<Args, anyhow::Result<Success>>
where
    Success: Clone,
{
    /// [anyhow::Error] can't be cloned, so errors are stored and returned by message
    pub fn set_returned_anyhow(&mut self, return_value: anyhow::Result<Success>) {
        self.return_value = Some(return_value.map_err(|err| anyhow!(format!("{}", err))));
    }

    pub fn return_value_anyhow(&self) -> anyhow::Result<Success> {
        match self.return_value {
            None => panic!("Tried to return from a mock whose return value wasn't set!"),
            Some(Ok(ref ok_result)) => Ok(ok_result.clone()),
            Some(Err(ref err)) => Err(anyhow!(format!("{}", err))),
        }
    }
}
