//! Hiring pipeline tool servers

use super::ToolServer;

pub mod analytics;
pub mod comms;
pub mod interview;
pub mod jobs;
pub mod offer;
pub mod onboarding;
pub mod resume;

pub static JOB_SERVER: ToolServer = ToolServer {
    name: "JobServer",
    tools: jobs::TOOLS,
};

pub static RESUME_SERVER: ToolServer = ToolServer {
    name: "ResumeServer",
    tools: resume::TOOLS,
};

pub static INTERVIEW_SERVER: ToolServer = ToolServer {
    name: "InterviewServer",
    tools: interview::TOOLS,
};

pub static OFFER_SERVER: ToolServer = ToolServer {
    name: "OfferServer",
    tools: offer::TOOLS,
};

pub static ONBOARDING_SERVER: ToolServer = ToolServer {
    name: "OnboardingServer",
    tools: onboarding::TOOLS,
};

pub static COMMS_SERVER: ToolServer = ToolServer {
    name: "CommsServer",
    tools: comms::TOOLS,
};

pub static ANALYTICS_SERVER: ToolServer = ToolServer {
    name: "AnalyticsServer",
    tools: analytics::TOOLS,
};
