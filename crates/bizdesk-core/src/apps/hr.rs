//! HR hiring desk

use bizdesk_store::AppKind;

use super::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::tools::hr::{
    ANALYTICS_SERVER, COMMS_SERVER, INTERVIEW_SERVER, JOB_SERVER, OFFER_SERVER,
    ONBOARDING_SERVER, RESUME_SERVER,
};

pub const DEFAULT_REPLY: &str = "I could not determine the right specialist for this request. \
Please rephrase in one line and mention one area: jobs, resumes/candidates, interviews, offers, \
onboarding, communications, or analytics.";

const SUPERVISOR_PROMPT: &str = "\
You are the supervisor of the HireSmart hiring desk. Send each request to exactly one \
specialist through its transfer tool and never answer it yourself.

- job: postings, vacancies, job descriptions, closing roles, department openings
- resume: candidates, CVs, applications, scoring, shortlisting, screening, rejecting a candidate
- interview: scheduling, rescheduling, cancelling, panels, feedback, upcoming interviews
- offer: offers, salary, compensation, approvals, acceptance or decline
- onboarding: day one, checklists, equipment and access, buddies, 30/60/90-day check-ins, welcome emails
- comms: candidate emails, notifications, status updates, invites, bulk updates, communication history
- analytics: reports, pipeline, metrics, time to hire, sources, funnel, acceptance rate
- default_answer: the intent is unclear, mixed, or fits no single specialist";

const JOB_PROMPT: &str = "\
You manage job postings for HireSmart: create, update, close, list, search by skill and report \
per department.
- Confirm the job_id whenever you create or update a posting.
- Show pipeline progress with get_job_applications_count.
- Give a reason when closing a job.";

const RESUME_PROMPT: &str = "\
You screen candidates for HireSmart: submit, score, list, shortlist, reject, rank and annotate.
- Score a resume before shortlisting it and cite the score.
- Competitive roles usually need 75 or more.
- Every rejection carries a professional reason.
- Break a score down into skills, experience and education when asked.";

const INTERVIEW_PROMPT: &str = "\
You schedule interviews for HireSmart and collect feedback.
- Check the interviewer is free before booking a slot.
- Summarise the recommendation and key scores when reporting feedback.
- Missing feedback blocks an offer; remind the recruiter.
- list_upcoming_interviews is the daily and weekly briefing.";

const OFFER_PROMPT: &str = "\
You manage offers for HireSmart: generate, approve, send, record responses and report.
- An offer must be approved before it is sent.
- State salary, start date and benefits plainly.
- Record the reason when a candidate declines.
- Flag offers that have waited more than five days for a response.";

const ONBOARDING_PROMPT: &str = "\
You run onboarding for HireSmart new joiners.
- Only hired candidates can get an onboarding record.
- Assign a buddy for every joiner and log the introduction.
- Standard tasks: IT setup, email, badge, training, tool access, orientation.
- Use get_pending_onboardings for the weekly HR summary.";

const COMMS_PROMPT: &str = "\
You handle candidate communications for HireSmart. Every message is logged against the \
candidate.
- Check the communication history first so nothing is sent twice.
- Confirm the job and message before a bulk update.
- Rejections stay professional and kind.
- Interview invites reference the interview id.";

const ANALYTICS_PROMPT: &str = "\
You are the hiring analyst for HireSmart.
- Open with the most actionable finding, then the numbers.
- Start general reports from get_pipeline_summary.
- Call out bottlenecks such as a weak interview to offer conversion.
- Compare time to hire with the 41-day industry benchmark.";

pub static APP: AppDefinition = AppDefinition {
    kind: AppKind::Hr,
    title: "HireSmart HR",
    supervisor_prompt: SUPERVISOR_PROMPT,
    mode: RoutingMode::Handoff,
    keyword_first: false,
    scoring: Scoring::MostHits,
    specialists: &[
        SpecialistDef {
            id: "job_agent",
            label: "Job Management",
            summary: "Route to the job agent: postings, vacancies, job descriptions, department jobs.",
            prompt: JOB_PROMPT,
            server: &JOB_SERVER,
            keywords: &[
                "job", "vacancy", "vacancies", "open role", "jd", "job description", "posting",
                "department jobs",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "resume_agent",
            label: "Resume Screening",
            summary: "Route to the resume agent: candidates, scoring, shortlisting, screening.",
            prompt: RESUME_PROMPT,
            server: &RESUME_SERVER,
            keywords: &[
                "resume", "cv", "candidate", "application", "score", "shortlist", "screening",
                "top candidates",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "interview_agent",
            label: "Interview Scheduling",
            summary: "Route to the interview agent: scheduling, feedback, upcoming interviews.",
            prompt: INTERVIEW_PROMPT,
            server: &INTERVIEW_SERVER,
            keywords: &[
                "interview", "schedule", "slot", "feedback", "panel", "upcoming interviews",
                "reschedule", "cancel interview",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "offer_agent",
            label: "Offer Management",
            summary: "Route to the offer agent: offers, salary, approvals, acceptance.",
            prompt: OFFER_PROMPT,
            server: &OFFER_SERVER,
            keywords: &[
                "offer", "salary", "compensation", "approval", "accept offer", "decline",
                "negotiate",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "onboarding_agent",
            label: "Onboarding",
            summary: "Route to the onboarding agent: day-one setup, checklists, buddies, check-ins.",
            prompt: ONBOARDING_PROMPT,
            server: &ONBOARDING_SERVER,
            keywords: &[
                "onboard", "onboarding", "day 1", "checklist", "buddy", "orientation",
                "welcome email",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "comms_agent",
            label: "Candidate Comms",
            summary: "Route to the comms agent: candidate emails, notifications, bulk updates.",
            prompt: COMMS_PROMPT,
            server: &COMMS_SERVER,
            keywords: &[
                "email", "notify", "status update", "rejection email", "invite", "bulk email",
                "communication history",
            ],
            strong: &[],
        },
        SpecialistDef {
            id: "analytics_agent",
            label: "Analytics",
            summary: "Route to the analytics agent: pipeline reports, time to hire, sources.",
            prompt: ANALYTICS_PROMPT,
            server: &ANALYTICS_SERVER,
            keywords: &[
                "analytics", "report", "pipeline", "metrics", "time-to-hire", "time to hire",
                "funnel", "statistics",
            ],
            strong: &[],
        },
    ],
    fallback: Fallback::Static {
        id: "default_answer",
        summary: "Route to the default answer when the intent is unclear or maps to no single specialist.",
        reply: DEFAULT_REPLY,
    },
    fallback_handoff: true,
    supervisor_context: 8,
    specialist_context: 10,
};
